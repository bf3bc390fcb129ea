/// Keyward: a tile-grid puzzle core.
///
/// `domain` holds the pure rules (tiles, bodies, the move resolver, enemy
/// AI, hazards, teleport), `sim` drives them one tick at a time through a
/// `LevelSession`, and `config` carries the tunables.

pub mod config;
pub mod domain;
pub mod sim;
