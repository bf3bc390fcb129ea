/// Movement and collision resolver: the single arbiter for grid steps.
///
/// ## can_enter truth table
/// ┌─────────────────────────────────────┬──────────┬──────────────────────┐
/// │ Condition (checked in order)         │ Result   │ Notes                │
/// ├─────────────────────────────────────┼──────────┼──────────────────────┤
/// │ Dest out of bounds                   │ DENY     │ closed boundary      │
/// │ Dest tile collidable, not hazard code│ DENY     │ wall/water/unknown   │
/// │ Occupant enemy / key / chest         │ ignore   │ resolved by contact  │
/// │ Occupant not solid (button, spike)   │ ignore   │                      │
/// │ Occupant pushable, push validates    │ continue │ recursive, same dir  │
/// │ Occupant pushable, push fails        │ DENY     │                      │
/// │ Occupant solid, not pushable         │ DENY     │ characters           │
/// │ Otherwise                            │ ALLOW    │                      │
/// └─────────────────────────────────────┴──────────┴──────────────────────┘
///
/// An occupant is any active entity other than the mover whose hitbox at its
/// committed target intersects the mover's hitbox at the destination.
///
/// Planning collects the whole push chain before anything is mutated; a move
/// either commits every link of the chain plus the mover, or nothing.

use super::entity::{Entity, EntityKind, Role};
use super::geom::Rect;
use super::grid::Grid;

/// Read-only view of the board for rule queries.
#[derive(Clone, Copy)]
pub struct Board<'a> {
    pub grid: &'a Grid,
    pub tile: i32,
}

impl<'a> Board<'a> {
    pub fn cell_rect(&self, col: i32, row: i32) -> Rect {
        Rect::new(col * self.tile, row * self.tile, self.tile, self.tile)
    }
}

/// One link of a push chain: entity `idx` moves to (col, row).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Push {
    pub idx: usize,
    pub col: i32,
    pub row: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Mover and every pushed entity now have new targets.
    Moved {
        col: i32,
        row: i32,
        pushed: Vec<Push>,
        /// Enemy killed by a brute on the way in.
        killed: Option<usize>,
    },
    /// Nothing changed.
    Blocked,
    /// A non-brute walked into an enemy and was deactivated.
    Died { enemy: usize },
    /// Inactive or mid-slide mover, or a zero direction.
    Ignored,
}

// ── Occupancy ──

fn target_hitbox(e: &Entity) -> Rect {
    e.body.predicted_hitbox(e.body.target_x, e.body.target_y)
}

/// Active entities other than `mover` sitting in the mover's way at (col, row).
fn occupants<'e>(
    board: &Board,
    entities: &'e [Entity],
    mover: usize,
    col: i32,
    row: i32,
) -> impl Iterator<Item = (usize, &'e Entity)> + 'e {
    let area = entities[mover].body.predicted_hitbox(col * board.tile, row * board.tile);
    entities.iter().enumerate()
        .filter(move |&(j, e)| j != mover && e.is_active() && target_hitbox(e).intersects(&area))
}

// ── can_enter ──

/// Can `mover` step into (col, row)? The push direction is the sign of the
/// offset from the mover's current cell.
pub fn can_enter(board: &Board, entities: &[Entity], mover: usize, col: i32, row: i32) -> bool {
    let Some(e) = entities.get(mover) else { return false };
    let (mc, mr) = e.body.cell(board.tile);
    let dir = ((col - mc).signum(), (row - mr).signum());
    let mut chain = vec![];
    plan_entry(board, entities, mover, col, row, dir, 0, &mut chain)
}

/// Validate entry and collect the push chain it requires.
fn plan_entry(
    board: &Board,
    entities: &[Entity],
    mover: usize,
    col: i32,
    row: i32,
    dir: (i32, i32),
    depth: usize,
    chain: &mut Vec<Push>,
) -> bool {
    if depth > board.grid.diagonal_len() {
        log::debug!("push chain exceeded depth {depth}; rejecting");
        return false;
    }
    if !board.grid.is_walkable(col, row) { return false; }

    for (j, other) in occupants(board, entities, mover, col, row) {
        let caps = other.caps();
        if !caps.solid || caps.pass_through { continue; }
        if !caps.pushable { return false; }
        if chain.iter().any(|p| p.idx == j) { continue; }
        if !plan_push(board, entities, j, dir, depth + 1, chain) { return false; }
    }
    true
}

/// Plan pushing `idx` one cell further along `dir`.
fn plan_push(
    board: &Board,
    entities: &[Entity],
    idx: usize,
    dir: (i32, i32),
    depth: usize,
    chain: &mut Vec<Push>,
) -> bool {
    if dir == (0, 0) { return false; }
    let (tc, tr) = entities[idx].body.target_cell(board.tile);
    let (nc, nr) = (tc + dir.0, tr + dir.1);
    let mark = chain.len();
    if plan_entry(board, entities, idx, nc, nr, dir, depth, chain) {
        chain.push(Push { idx, col: nc, row: nr });
        true
    } else {
        chain.truncate(mark);
        false
    }
}

/// The entity the mover runs into at (col, row): enemies first, then the
/// first solid occupant in insertion order.
fn blocker(board: &Board, entities: &[Entity], mover: usize, col: i32, row: i32) -> Option<usize> {
    let mut first_solid = None;
    for (j, other) in occupants(board, entities, mover, col, row) {
        if other.is_enemy() { return Some(j); }
        if first_solid.is_none() && other.caps().solid {
            first_solid = Some(j);
        }
    }
    first_solid
}

// ── attempt_move ──

/// Player-initiated step of one cell in (dx, dy).
pub fn attempt_move(board: &Board, entities: &mut [Entity], mover: usize, dx: i32, dy: i32) -> MoveOutcome {
    let Some(m) = entities.get(mover) else { return MoveOutcome::Ignored };
    if !m.is_active() || m.body.moving_to_target || (dx, dy) == (0, 0) {
        return MoveOutcome::Ignored;
    }
    let dir = (dx.signum(), dy.signum());
    let (col, row) = m.body.cell(board.tile);
    let (nc, nr) = (col + dir.0, row + dir.1);

    let mut chain = vec![];
    if !plan_entry(board, entities, mover, nc, nr, dir, 0, &mut chain) {
        return MoveOutcome::Blocked;
    }

    let mut killed = None;
    if let Some(b) = blocker(board, entities, mover, nc, nr) {
        let other = &entities[b];
        let caps = other.caps();
        if other.is_enemy() {
            // Rule 1: contact with an enemy.
            if m.role() == Some(Role::Brute) {
                killed = Some(b);
            } else {
                entities[mover].body.active = false;
                return MoveOutcome::Died { enemy: b };
            }
        } else if caps.pushable {
            // Rule 2: push the occupant; pass-through pushables (keys) are
            // not yet in the chain.
            if !chain.iter().any(|p| p.idx == b)
                && !plan_push(board, entities, b, dir, 1, &mut chain)
            {
                return MoveOutcome::Blocked;
            }
        } else if caps.solid && !caps.pass_through {
            // Rule 3.
            return MoveOutcome::Blocked;
        }
    }

    // Commit: the chain was fully validated above.
    if let Some(k) = killed {
        entities[k].body.active = false;
    }
    for p in &chain {
        entities[p.idx].body.set_target_cell(p.col, p.row, board.tile);
    }
    let body = &mut entities[mover].body;
    body.set_target_cell(nc, nr, board.tile);
    body.face_toward(dir.0);

    log::debug!("entity {mover} -> ({nc},{nr}), pushed {}", chain.len());
    MoveOutcome::Moved { col: nc, row: nr, pushed: chain, killed }
}

// ── Enemy stepping ──

/// Can enemy `mover` step into (col, row)? Tiles, other enemies and crates
/// block; enemies never push. Keys, chests and characters never block:
/// stepping onto a character is how an enemy catches it.
pub fn enemy_can_enter(board: &Board, entities: &[Entity], mover: usize, col: i32, row: i32) -> bool {
    if !board.grid.is_walkable(col, row) { return false; }
    let tile = board.tile;
    !entities.iter().enumerate().any(|(j, e)| {
        if j == mover || !e.is_active() { return false; }
        match e.kind {
            EntityKind::Enemy(_) => e.body.target_cell(tile) == (col, row) || e.body.cell(tile) == (col, row),
            EntityKind::Crate { .. } => e.body.target_cell(tile) == (col, row),
            _ => false,
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::entity::{Character, Enemy, EnemyPreset, EntityId, Spike};
    use crate::domain::grid::tests::codes_from;

    pub(crate) const TS: i32 = 48;

    pub(crate) fn spawn(kind: EntityKind, col: i32, row: i32, n: &mut u32) -> Entity {
        *n += 1;
        Entity::new(EntityId(*n), kind, col, row, TS, 4)
    }

    /// Build a grid plus entities from a diagram.
    /// Terrain: '#' wall, '~' water, '.' floor.
    /// Entities: 'B' brute, 'S' stealth, 'C' caster, 'x' crate, 'k' key,
    /// 'h' chest, 'E' roaming enemy, 'G' stationary enemy, '^' spike 0.
    pub(crate) fn scene(rows: &[&str]) -> (Grid, Vec<Entity>) {
        let grid = Grid::from_codes(&codes_from(rows));
        let mut n = 0;
        let mut entities = vec![];
        for (r, line) in rows.iter().enumerate() {
            for (c, ch) in line.chars().enumerate() {
                let (c, r) = (c as i32, r as i32);
                let kind = match ch {
                    'B' => EntityKind::Character(Character::new(Role::Brute)),
                    'S' => EntityKind::Character(Character::new(Role::Stealth)),
                    'C' => EntityKind::Character(Character::new(Role::Caster)),
                    'x' => EntityKind::Crate { variant: 0 },
                    'k' => EntityKind::Key,
                    'h' => EntityKind::Chest,
                    'E' => EntityKind::Enemy(Enemy::new(EnemyPreset::Roaming, c, r)),
                    'G' => EntityKind::Enemy(Enemy::new(EnemyPreset::Stationary, c, r)),
                    '^' => EntityKind::Spike(Spike { id: 0, extended: true }),
                    _ => continue,
                };
                entities.push(spawn(kind, c, r, &mut n));
            }
        }
        (grid, entities)
    }

    fn idle_targets(es: &[Entity]) -> Vec<(i32, i32, bool)> {
        es.iter().map(|e| (e.body.target_x, e.body.target_y, e.body.active)).collect()
    }

    #[test]
    fn walls_and_bounds_block() {
        let (grid, es) = scene(&["B#", ".."]);
        let board = Board { grid: &grid, tile: TS };
        assert!(!can_enter(&board, &es, 0, 1, 0));
        assert!(!can_enter(&board, &es, 0, -1, 0));
        assert!(!can_enter(&board, &es, 0, 0, -1));
        assert!(can_enter(&board, &es, 0, 0, 1));
    }

    #[test]
    fn single_push_needs_both_destinations_free() {
        let (grid, mut es) = scene(&["Bx.", "Bx#"]);
        let board = Board { grid: &grid, tile: TS };
        assert!(can_enter(&board, &es, 0, 1, 0));
        assert!(!can_enter(&board, &es, 2, 1, 1));

        let before = idle_targets(&es);
        assert_eq!(attempt_move(&board, &mut es, 2, 1, 0), MoveOutcome::Blocked);
        assert_eq!(idle_targets(&es), before);

        match attempt_move(&board, &mut es, 0, 1, 0) {
            MoveOutcome::Moved { col, row, pushed, killed } => {
                assert_eq!((col, row), (1, 0));
                assert_eq!(pushed, vec![Push { idx: 1, col: 2, row: 0 }]);
                assert_eq!(killed, None);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(es[1].body.target_cell(TS), (2, 0));
        assert!(es[1].body.moving_to_target);
    }

    #[test]
    fn push_into_character_fails_without_mutation() {
        let (grid, mut es) = scene(&["BxS."]);
        let board = Board { grid: &grid, tile: TS };
        let before = idle_targets(&es);
        assert_eq!(attempt_move(&board, &mut es, 0, 1, 0), MoveOutcome::Blocked);
        assert_eq!(idle_targets(&es), before);
        assert!(es.iter().all(|e| !e.body.moving_to_target));
    }

    #[test]
    fn chain_commits_whole_or_not_at_all() {
        let (grid, mut es) = scene(&["Bxx.", "Bxx#"]);
        let board = Board { grid: &grid, tile: TS };

        let before = idle_targets(&es);
        assert_eq!(attempt_move(&board, &mut es, 3, 1, 0), MoveOutcome::Blocked);
        assert_eq!(idle_targets(&es), before);

        let MoveOutcome::Moved { pushed, .. } = attempt_move(&board, &mut es, 0, 1, 0) else {
            panic!("chain push should succeed");
        };
        assert_eq!(pushed.len(), 2);
        assert_eq!(es[1].body.target_cell(TS), (2, 0));
        assert_eq!(es[2].body.target_cell(TS), (3, 0));
    }

    #[test]
    fn character_blocks_character() {
        let (grid, mut es) = scene(&["BS"]);
        let board = Board { grid: &grid, tile: TS };
        assert_eq!(attempt_move(&board, &mut es, 0, 1, 0), MoveOutcome::Blocked);
    }

    #[test]
    fn brute_kills_enemy_and_moves() {
        let (grid, mut es) = scene(&["BE."]);
        let board = Board { grid: &grid, tile: TS };
        let out = attempt_move(&board, &mut es, 0, 1, 0);
        assert_eq!(out, MoveOutcome::Moved { col: 1, row: 0, pushed: vec![], killed: Some(1) });
        assert!(!es[1].is_active());
        assert_eq!(es[0].body.target_cell(TS), (1, 0));
    }

    #[test]
    fn non_brute_dies_in_place() {
        let (grid, mut es) = scene(&["SE."]);
        let board = Board { grid: &grid, tile: TS };
        assert_eq!(attempt_move(&board, &mut es, 0, 1, 0), MoveOutcome::Died { enemy: 1 });
        assert!(!es[0].is_active());
        assert!(es[1].is_active());
        assert_eq!((es[0].body.x, es[0].body.target_x), (0, 0));
    }

    #[test]
    fn key_is_pushed_even_though_it_never_blocks() {
        let (grid, mut es) = scene(&["Bk.", "Bk#"]);
        let board = Board { grid: &grid, tile: TS };
        assert!(matches!(attempt_move(&board, &mut es, 0, 1, 0), MoveOutcome::Moved { .. }));
        assert_eq!(es[1].body.target_cell(TS), (2, 0));
        assert_eq!(attempt_move(&board, &mut es, 2, 1, 0), MoveOutcome::Blocked);
        assert_eq!(es[3].body.target_cell(TS), (1, 1));
    }

    #[test]
    fn chest_is_walked_onto_not_pushed() {
        let (grid, mut es) = scene(&["Bh."]);
        let board = Board { grid: &grid, tile: TS };
        assert!(matches!(attempt_move(&board, &mut es, 0, 1, 0), MoveOutcome::Moved { pushed, .. } if pushed.is_empty()));
        assert_eq!(es[1].body.target_cell(TS), (1, 0));
    }

    #[test]
    fn spikes_never_block() {
        let (grid, es) = scene(&["B^"]);
        let board = Board { grid: &grid, tile: TS };
        assert!(can_enter(&board, &es, 0, 1, 0));
    }

    #[test]
    fn sliding_or_inactive_movers_are_ignored() {
        let (grid, mut es) = scene(&["B..", "S.."]);
        let board = Board { grid: &grid, tile: TS };
        assert!(matches!(attempt_move(&board, &mut es, 0, 1, 0), MoveOutcome::Moved { .. }));
        assert_eq!(attempt_move(&board, &mut es, 0, 1, 0), MoveOutcome::Ignored);
        es[1].body.active = false;
        assert_eq!(attempt_move(&board, &mut es, 1, 1, 0), MoveOutcome::Ignored);
        assert_eq!(es[1].body.target_cell(TS), (0, 1));
    }

    #[test]
    fn reserved_hazard_cells_are_walkable() {
        let (grid, es) = scene(&["BR"]);
        let board = Board { grid: &grid, tile: TS };
        assert!(can_enter(&board, &es, 0, 1, 0));
    }

    #[test]
    fn push_chain_depth_is_capped() {
        let (grid, es) = scene(&["Bx..."]);
        let board = Board { grid: &grid, tile: TS };
        let cap = grid.diagonal_len();
        let mut chain = vec![];
        assert!(plan_entry(&board, &es, 0, 1, 0, (1, 0), cap - 1, &mut chain));
        assert_eq!(chain.len(), 1);
        chain.clear();
        assert!(!plan_entry(&board, &es, 0, 1, 0, (1, 0), cap, &mut chain));
        assert!(!plan_entry(&board, &es, 0, 2, 0, (1, 0), cap + 1, &mut chain));
    }

    #[test]
    fn enemies_walk_onto_keys_and_chests_but_not_crates() {
        let (grid, es) = scene(&["Ek.", "Eh.", "Ex."]);
        let board = Board { grid: &grid, tile: TS };
        assert!(enemy_can_enter(&board, &es, 0, 1, 0));
        assert!(enemy_can_enter(&board, &es, 2, 1, 1));
        assert!(!enemy_can_enter(&board, &es, 4, 1, 2));
    }

    #[test]
    fn enemies_block_each_other_but_not_characters() {
        let (grid, es) = scene(&["E.E", "EB.", "Ex."]);
        let board = Board { grid: &grid, tile: TS };
        assert!(!enemy_can_enter(&board, &es, 0, 2, 0));
        assert!(enemy_can_enter(&board, &es, 0, 1, 0));
        assert!(enemy_can_enter(&board, &es, 2, 1, 1));
        assert!(!enemy_can_enter(&board, &es, 4, 1, 2));
    }
}
