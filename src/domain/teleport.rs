/// Caster teleport: a two-stage, input-driven selection.
///
///   Idle ──begin──▶ SelectingTarget ──confirm(hit)──▶ SelectingDestination
///    ▲                   │  cancel                          │ confirm(valid)
///    └───────────────────┴──────────────────────────────────┘ / cancel
///
/// The cursor starts on the caster's cell and is confined to a square of
/// radius `TELEPORT_RADIUS` around it. Nothing is mutated until the final
/// confirm, so cancel simply drops the state.

use super::entity::{Dir, Entity, EntityId, EntityKind};
use super::resolver::Board;

pub const TELEPORT_RADIUS: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Teleport {
    #[default]
    Idle,
    SelectingTarget { origin: (i32, i32), cursor: (i32, i32) },
    SelectingDestination { origin: (i32, i32), cursor: (i32, i32), target: EntityId },
}

/// Result of a confirm press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirm {
    /// Nothing selectable or destination invalid; state unchanged.
    Rejected,
    Selected(EntityId),
    Teleported { id: EntityId, col: i32, row: i32 },
}

impl Teleport {
    pub fn is_active(&self) -> bool {
        !matches!(self, Teleport::Idle)
    }

    pub fn begin(&mut self, origin: (i32, i32)) {
        *self = Teleport::SelectingTarget { origin, cursor: origin };
    }

    pub fn cancel(&mut self) {
        *self = Teleport::Idle;
    }

    pub fn cursor(&self) -> Option<(i32, i32)> {
        match *self {
            Teleport::Idle => None,
            Teleport::SelectingTarget { cursor, .. }
            | Teleport::SelectingDestination { cursor, .. } => Some(cursor),
        }
    }

    pub fn selected(&self) -> Option<EntityId> {
        match *self {
            Teleport::SelectingDestination { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Move the cursor one cell, staying on the board and within the radius.
    pub fn move_cursor(&mut self, dir: Dir, board: &Board) {
        let (dx, dy) = dir.delta();
        if let Teleport::SelectingTarget { origin, cursor }
        | Teleport::SelectingDestination { origin, cursor, .. } = self
        {
            let next = (cursor.0 + dx, cursor.1 + dy);
            let within = (next.0 - origin.0).abs() <= TELEPORT_RADIUS
                && (next.1 - origin.1).abs() <= TELEPORT_RADIUS;
            if within && board.grid.in_bounds(next.0, next.1) {
                *cursor = next;
            }
        }
    }

    /// Advance the selection. Only the teleported entity itself is ignored
    /// as an occupant of the destination cell.
    pub fn confirm(&mut self, board: &Board, entities: &mut [Entity]) -> Confirm {
        match *self {
            Teleport::Idle => Confirm::Rejected,
            Teleport::SelectingTarget { origin, cursor } => {
                match pick_target(board, entities, cursor) {
                    Some(target) => {
                        *self = Teleport::SelectingDestination { origin, cursor, target };
                        Confirm::Selected(target)
                    }
                    None => Confirm::Rejected,
                }
            }
            Teleport::SelectingDestination { cursor, target, .. } => {
                let Some(idx) = entities.iter().position(|e| e.id == target && e.is_active()) else {
                    *self = Teleport::Idle;
                    return Confirm::Rejected;
                };
                if !destination_free(board, entities, idx, cursor) {
                    return Confirm::Rejected;
                }
                entities[idx].body.place_at_cell(cursor.0, cursor.1, board.tile);
                *self = Teleport::Idle;
                log::debug!("teleported {target:?} to ({},{})", cursor.0, cursor.1);
                Confirm::Teleported { id: target, col: cursor.0, row: cursor.1 }
            }
        }
    }
}

/// First active character, crate or key under the cursor.
fn pick_target(board: &Board, entities: &[Entity], cell: (i32, i32)) -> Option<EntityId> {
    let area = board.cell_rect(cell.0, cell.1);
    entities.iter()
        .filter(|e| e.is_active())
        .filter(|e| matches!(e.kind, EntityKind::Character(_) | EntityKind::Crate { .. } | EntityKind::Key))
        .find(|e| e.body.world_hitbox().intersects(&area))
        .map(|e| e.id)
}

fn destination_free(board: &Board, entities: &[Entity], target: usize, cell: (i32, i32)) -> bool {
    if !board.grid.in_bounds(cell.0, cell.1) || board.grid.is_collidable(cell.0, cell.1) {
        return false;
    }
    let area = board.cell_rect(cell.0, cell.1);
    !entities.iter().enumerate().any(|(j, e)| {
        if !e.is_active() { return false; }
        let solid_here = j != target && e.caps().solid && e.body.world_hitbox().intersects(&area);
        let spike_here = e.is_armed_spike() && e.body.cell(board.tile) == cell;
        solid_here || spike_here
    })
}
