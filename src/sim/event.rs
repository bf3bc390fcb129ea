/// Events emitted during a simulation tick.
/// The host consumes these for status messages and level flow.

use crate::domain::entity::EntityId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    CharacterMoved { id: EntityId, col: i32, row: i32 },
    EntityPushed { id: EntityId, col: i32, row: i32 },
    EnemyKilled { id: EntityId, by: EntityId },
    CharacterKilled { id: EntityId, cause: DeathCause },
    EnemySpotted { id: EntityId, target: EntityId },
    EnemyLostTarget { id: EntityId },
    ButtonChanged { button: u32, pressed: bool },
    KeyDestroyed { id: EntityId },
    SwitchedCharacter { index: usize },
    TeleportStarted,
    TeleportTargetSelected { id: EntityId },
    Teleported { id: EntityId, col: i32, row: i32 },
    TeleportCancelled,
    Won,
    Lost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeathCause {
    Enemy(EntityId),
    Spike,
}
