/// Tile codes and their properties.
///
/// A level arrives as a grid of raw integer codes. Some codes are terrain
/// (floor, wall, water, bridge); others are spawn markers that put an entity
/// on a floor cell. Properties are queried via methods, not stored as flags,
/// so code semantics are centralized here.

use super::entity::{ButtonMode, EnemyPreset, Role};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Terrain {
    Floor,
    Wall,
    Water,
    Bridge,
}

impl Terrain {
    pub fn is_collidable(self) -> bool {
        matches!(self, Terrain::Wall | Terrain::Water)
    }
}

/// What a raw code means.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TileCode {
    Terrain(Terrain),
    Character(Role),
    Crate(u8),
    Enemy(EnemyPreset),
    Button { id: u32, mode: ButtonMode },
    Spike { id: u32 },
    Key,
    Chest,
    /// Reserved overlay range 100–114: collidable tile, walkable hazard layer.
    Reserved(i32),
    Unknown(i32),
}

pub const KEY_CODE: i32 = 8;
pub const CHEST_CODE: i32 = 9;

impl TileCode {
    pub fn classify(code: i32) -> TileCode {
        match code {
            0 | 1 => TileCode::Terrain(Terrain::Floor),
            2..=7 => TileCode::Terrain(Terrain::Wall),
            KEY_CODE => TileCode::Key,
            CHEST_CODE => TileCode::Chest,
            10..=14 => TileCode::Terrain(Terrain::Water),
            20 | 21 => TileCode::Terrain(Terrain::Bridge),
            50..=59 => TileCode::Crate((code - 50) as u8),
            60..=64 => TileCode::Button { id: (code - 60) as u32, mode: ButtonMode::Hold },
            65..=69 => TileCode::Button { id: (code - 60) as u32, mode: ButtonMode::Toggle },
            70..=79 => TileCode::Spike { id: (code - 70) as u32 },
            80 => TileCode::Enemy(EnemyPreset::Roaming),
            81 => TileCode::Enemy(EnemyPreset::Stationary),
            90 => TileCode::Character(Role::Brute),
            91 => TileCode::Character(Role::Stealth),
            92 => TileCode::Character(Role::Caster),
            100..=114 => TileCode::Reserved(code),
            other => TileCode::Unknown(other),
        }
    }

    /// Terrain underneath this code. Spawn markers sit on floor.
    /// `None` for codes outside the tile table.
    pub fn terrain(self) -> Option<Terrain> {
        match self {
            TileCode::Terrain(t) => Some(t),
            TileCode::Reserved(_) | TileCode::Unknown(_) => None,
            _ => Some(Terrain::Floor),
        }
    }

    /// Does this code place an entity at level load?
    pub fn is_spawn_marker(self) -> bool {
        !matches!(self, TileCode::Terrain(_) | TileCode::Reserved(_) | TileCode::Unknown(_))
    }
}

/// Codes governed by the hazard layer rather than the tile layer:
/// buttons (60–69), spikes (70–79) and the reserved safe range (100–114).
pub fn is_hazard_walkable(code: i32) -> bool {
    matches!(code, 60..=69 | 70..=79 | 100..=114)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terrain_codes() {
        assert_eq!(TileCode::classify(0), TileCode::Terrain(Terrain::Floor));
        assert_eq!(TileCode::classify(4), TileCode::Terrain(Terrain::Wall));
        assert_eq!(TileCode::classify(12), TileCode::Terrain(Terrain::Water));
        assert_eq!(TileCode::classify(21), TileCode::Terrain(Terrain::Bridge));
        assert!(Terrain::Wall.is_collidable());
        assert!(Terrain::Water.is_collidable());
        assert!(!Terrain::Bridge.is_collidable());
    }

    #[test]
    fn button_ranges_split_hold_and_toggle() {
        assert_eq!(TileCode::classify(60), TileCode::Button { id: 0, mode: ButtonMode::Hold });
        assert_eq!(TileCode::classify(64), TileCode::Button { id: 4, mode: ButtonMode::Hold });
        assert_eq!(TileCode::classify(65), TileCode::Button { id: 5, mode: ButtonMode::Toggle });
        assert_eq!(TileCode::classify(73), TileCode::Spike { id: 3 });
    }

    #[test]
    fn spawn_markers_sit_on_floor() {
        for code in [8, 9, 52, 61, 77, 80, 81, 90, 91, 92] {
            let c = TileCode::classify(code);
            assert!(c.is_spawn_marker(), "code {code}");
            assert_eq!(c.terrain(), Some(Terrain::Floor));
        }
    }

    #[test]
    fn unknown_and_reserved_have_no_terrain() {
        assert_eq!(TileCode::classify(15), TileCode::Unknown(15));
        assert_eq!(TileCode::classify(-1), TileCode::Unknown(-1));
        assert_eq!(TileCode::classify(107).terrain(), None);
    }

    #[test]
    fn hazard_walkable_ranges() {
        assert!(is_hazard_walkable(60));
        assert!(is_hazard_walkable(79));
        assert!(is_hazard_walkable(100));
        assert!(is_hazard_walkable(114));
        assert!(!is_hazard_walkable(80));
        assert!(!is_hazard_walkable(115));
        assert!(!is_hazard_walkable(2));
    }
}
