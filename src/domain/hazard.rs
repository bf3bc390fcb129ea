/// Buttons, spikes and the link table between them.
///
/// ## Button semantics
/// ┌──────────┬──────────────────────────────┬────────────────────────────┐
/// │ Mode     │ pressed                      │ linked spikes              │
/// ├──────────┼──────────────────────────────┼────────────────────────────┤
/// │ HOLD     │ = overlap this tick          │ press → retract            │
/// │          │                              │ release → extend           │
/// │ TOGGLE   │ flips on overlap rising edge │ = !pressed after each flip │
/// └──────────┴──────────────────────────────┴────────────────────────────┘
///
/// Overlap means any active non-button entity's hitbox intersects the
/// button's hitbox. Spikes start extended.

use std::collections::{BTreeMap, BTreeSet};

use super::entity::{ButtonMode, Entity, EntityKind, Role};

/// Inward inset on spike hitboxes so that edge contact is not lethal.
pub const SPIKE_TOLERANCE: i32 = 2;

/// Button id → linked spike ids. Static for a level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkTable {
    links: BTreeMap<u32, BTreeSet<u32>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(u32, u32)]) -> Self {
        let mut table = Self::new();
        for &(button, spike) in pairs {
            table.link(button, spike);
        }
        table
    }

    pub fn link(&mut self, button: u32, spike: u32) {
        self.links.entry(button).or_default().insert(spike);
    }

    pub fn spikes_for(&self, button: u32) -> impl Iterator<Item = u32> + '_ {
        self.links.get(&button).into_iter().flat_map(|s| s.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn pairs(&self) -> Vec<(u32, u32)> {
        self.links.iter()
            .flat_map(|(&b, spikes)| spikes.iter().map(move |&s| (b, s)))
            .collect()
    }
}

/// A button changed its pressed state and drove its spikes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonChange {
    pub button: u32,
    pub pressed: bool,
    /// Extended state written to every linked spike.
    pub spikes_extended: bool,
}

/// Recompute every button against current overlaps and drive linked spikes.
/// Call once per tick.
pub fn evaluate_buttons(entities: &mut [Entity], links: &LinkTable) -> Vec<ButtonChange> {
    let mut changes = vec![];

    for i in 0..entities.len() {
        if !entities[i].is_active() { continue; }
        let EntityKind::Button(_) = entities[i].kind else { continue };

        let area = entities[i].body.world_hitbox();
        let overlap = entities.iter().enumerate().any(|(j, e)| {
            j != i
                && e.is_active()
                && !matches!(e.kind, EntityKind::Button(_))
                && e.body.world_hitbox().intersects(&area)
        });

        let EntityKind::Button(button) = &mut entities[i].kind else { continue };
        let rising = overlap && !button.was_overlapped;
        button.was_overlapped = overlap;

        let flipped = match button.mode {
            ButtonMode::Hold => {
                let changed = button.pressed != overlap;
                button.pressed = overlap;
                changed
            }
            ButtonMode::Toggle => {
                if rising { button.pressed = !button.pressed; }
                rising
            }
        };

        if flipped {
            changes.push(ButtonChange {
                button: button.id,
                pressed: button.pressed,
                spikes_extended: !button.pressed,
            });
        }
    }

    for change in &changes {
        let linked: Vec<u32> = links.spikes_for(change.button).collect();
        for e in entities.iter_mut() {
            if let EntityKind::Spike(spike) = &mut e.kind {
                if linked.contains(&spike.id) {
                    spike.extended = change.spikes_extended;
                }
            }
        }
        log::debug!("button {} pressed={} -> spikes {:?} extended={}",
            change.button, change.pressed, linked, change.spikes_extended);
    }

    changes
}

/// Extended spike that kills entity `idx`, if any. Stealth characters are
/// immune; only characters are tested.
pub fn lethal_spike(entities: &[Entity], idx: usize) -> Option<usize> {
    let victim = entities.get(idx)?;
    if !victim.is_active() { return None; }
    match victim.role() {
        Some(Role::Stealth) | None => return None,
        Some(_) => {}
    }
    let hitbox = victim.body.world_hitbox();
    entities.iter().position(|e| {
        e.is_armed_spike() && e.body.world_hitbox().inset(SPIKE_TOLERANCE).intersects(&hitbox)
    })
}

/// Extended spike sharing a tile with entity `idx`.
pub fn spike_on_tile(entities: &[Entity], idx: usize, tile: i32) -> Option<usize> {
    let cell = entities.get(idx)?.body.cell(tile);
    entities.iter().position(|e| e.is_armed_spike() && e.body.cell(tile) == cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{Button, Character, EntityId, Spike};

    const TS: i32 = 48;

    fn ent(id: u32, kind: EntityKind, col: i32, row: i32) -> Entity {
        Entity::new(EntityId(id), kind, col, row, TS, 4)
    }

    fn spike_extended(es: &[Entity], idx: usize) -> bool {
        matches!(&es[idx].kind, EntityKind::Spike(s) if s.extended)
    }

    fn pressed(es: &[Entity], idx: usize) -> bool {
        matches!(&es[idx].kind, EntityKind::Button(b) if b.pressed)
    }

    /// Button at (0,0), spike at (3,0), a crate that is on the button when
    /// the overlap flag says so and off at (1,0) otherwise.
    fn rig(mode: ButtonMode) -> (Vec<Entity>, LinkTable) {
        let es = vec![
            ent(1, EntityKind::Button(Button::new(2, mode)), 0, 0),
            ent(2, EntityKind::Spike(Spike { id: 4, extended: true }), 3, 0),
            ent(3, EntityKind::Crate { variant: 0 }, 1, 0),
        ];
        (es, LinkTable::from_pairs(&[(2, 4)]))
    }

    fn set_overlap(es: &mut [Entity], on: bool) {
        let col = if on { 0 } else { 1 };
        es[2].body.place_at_cell(col, 0, TS);
    }

    #[test]
    fn toggle_flips_only_on_rising_edges() {
        let (mut es, links) = rig(ButtonMode::Toggle);
        let overlaps = [false, true, true, false, true];
        let mut flips = vec![];
        for (tick, &on) in overlaps.iter().enumerate() {
            set_overlap(&mut es, on);
            if !evaluate_buttons(&mut es, &links).is_empty() {
                flips.push(tick + 1);
            }
        }
        assert_eq!(flips, vec![2, 5]);
        assert!(!pressed(&es, 0));
        assert!(spike_extended(&es, 1));
    }

    #[test]
    fn toggle_retracts_spikes_while_pressed() {
        let (mut es, links) = rig(ButtonMode::Toggle);
        set_overlap(&mut es, true);
        evaluate_buttons(&mut es, &links);
        set_overlap(&mut es, false);
        evaluate_buttons(&mut es, &links);
        assert!(pressed(&es, 0));
        assert!(!spike_extended(&es, 1));
    }

    #[test]
    fn hold_tracks_overlap_without_memory() {
        let (mut es, links) = rig(ButtonMode::Hold);
        set_overlap(&mut es, true);
        let changes = evaluate_buttons(&mut es, &links);
        assert_eq!(changes, vec![ButtonChange { button: 2, pressed: true, spikes_extended: false }]);
        assert!(!spike_extended(&es, 1));

        assert!(evaluate_buttons(&mut es, &links).is_empty());

        set_overlap(&mut es, false);
        evaluate_buttons(&mut es, &links);
        assert!(!pressed(&es, 0));
        assert!(spike_extended(&es, 1));
    }

    #[test]
    fn inactive_entities_do_not_press() {
        let (mut es, links) = rig(ButtonMode::Hold);
        set_overlap(&mut es, true);
        es[2].body.active = false;
        assert!(evaluate_buttons(&mut es, &links).is_empty());
    }

    #[test]
    fn unlinked_spikes_are_untouched() {
        let (mut es, _) = rig(ButtonMode::Hold);
        set_overlap(&mut es, true);
        evaluate_buttons(&mut es, &LinkTable::new());
        assert!(pressed(&es, 0));
        assert!(spike_extended(&es, 1));
    }

    #[test]
    fn many_spikes_per_button() {
        let t = LinkTable::from_pairs(&[(1, 3), (1, 5), (2, 3)]);
        assert_eq!(t.spikes_for(1).collect::<Vec<_>>(), vec![3, 5]);
        assert_eq!(t.spikes_for(9).count(), 0);
        assert_eq!(t.pairs(), vec![(1, 3), (1, 5), (2, 3)]);
    }

    #[test]
    fn stealth_is_immune_other_roles_are_not() {
        for (role, dies) in [(Role::Stealth, false), (Role::Brute, true), (Role::Caster, true)] {
            let es = vec![
                ent(1, EntityKind::Character(Character::new(role)), 2, 2),
                ent(2, EntityKind::Spike(Spike { id: 0, extended: true }), 2, 2),
            ];
            assert_eq!(lethal_spike(&es, 0).is_some(), dies, "{role:?}");
        }
    }

    #[test]
    fn retracted_or_adjacent_spikes_are_harmless() {
        let mut es = vec![
            ent(1, EntityKind::Character(Character::new(Role::Brute)), 2, 2),
            ent(2, EntityKind::Spike(Spike { id: 0, extended: true }), 3, 2),
            ent(3, EntityKind::Spike(Spike { id: 1, extended: false }), 2, 2),
        ];
        assert_eq!(lethal_spike(&es, 0), None);
        es[1].body.place_at_cell(2, 3, TS);
        assert_eq!(lethal_spike(&es, 0), None);
        es[1].body.place_at_cell(2, 1, TS);
        assert_eq!(lethal_spike(&es, 0), None);
    }

    #[test]
    fn key_on_spike_tile() {
        let es = vec![
            ent(1, EntityKind::Key, 4, 4),
            ent(2, EntityKind::Spike(Spike { id: 0, extended: true }), 4, 4),
        ];
        assert_eq!(spike_on_tile(&es, 0, TS), Some(1));
    }
}
