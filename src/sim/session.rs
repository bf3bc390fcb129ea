/// LevelSession: one running instance of a level.
///
/// Owns the grid, every entity, the link table and the game state. The host
/// calls `update()` once per fixed tick and reads `render_state()` whenever
/// it draws.
///
/// Per-tick order:
///   0. Player input (switch, teleport, move). Skipped mid-slide.
///   1. Interpolation + character animation
///   2. Enemy AI
///   3. Character ↔ enemy contact
///   4. Buttons, spikes, lethal spike test
///   5. Key ↔ chest / key ↔ spike
///
/// WON and LOST are terminal: `update()` becomes a no-op until `restart()`.

use rand::SeedableRng;
use rand_pcg::Pcg32;

use crate::config::{BoardConfig, GameConfig, SpeedConfig};
use crate::domain::ai::{self, AiNote, AiParams};
use crate::domain::entity::{
    Button, Character, Dir, Enemy, Entity, EntityId, EntityKind, EntityTag, Facing, Role, Spike,
};
use crate::domain::geom::Rect;
use crate::domain::grid::Grid;
use crate::domain::hazard::{self, LinkTable};
use crate::domain::resolver::{self, Board, MoveOutcome};
use crate::domain::teleport::{Confirm, Teleport};
use crate::domain::tile::TileCode;
use super::event::{DeathCause, GameEvent};
use super::level::{LevelData, LevelError};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GameState {
    Playing,
    Won,
    Lost,
}

/// Input sampled for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameInput {
    pub movement: Option<Dir>,
    pub switch_character: bool,
    /// Start teleport selection, or confirm the current stage.
    pub teleport: bool,
    pub cancel: bool,
}

// ── Render snapshot ──

#[derive(Clone, Debug)]
pub struct RenderEntity {
    pub id: EntityId,
    pub tag: EntityTag,
    pub role: Option<Role>,
    pub x: i32,
    pub y: i32,
    pub hitbox: Rect,
    pub facing: Facing,
    pub frame: u32,
    /// Button pressed, or spike extended.
    pub armed: bool,
    pub chasing: bool,
    pub controlled: bool,
}

#[derive(Clone, Debug)]
pub struct RenderState {
    pub state: GameState,
    /// Active entities in draw order.
    pub entities: Vec<RenderEntity>,
    pub cursor: Option<(i32, i32)>,
    pub selected: Option<EntityId>,
}

pub struct LevelSession {
    level: LevelData,
    board: BoardConfig,
    speed: SpeedConfig,
    ai: AiParams,
    seed: u64,

    grid: Grid,
    entities: Vec<Entity>,
    links: LinkTable,
    state: GameState,
    /// Index into the characters, in insertion order.
    controlled: usize,
    teleport: Teleport,
    rng: Pcg32,
    tick: u64,
}

// ── Construction ──

impl LevelSession {
    pub fn new(level: LevelData, config: &GameConfig) -> Result<Self, LevelError> {
        validate(&level, &config.board)?;
        let mut session = LevelSession {
            grid: Grid::from_codes(&level.codes),
            level,
            board: config.board,
            speed: config.speed.clone(),
            ai: AiParams {
                detect_range: config.ai.detect_range,
                patrol_distance: config.ai.patrol_distance,
                move_cooldown: config.speed.enemy_move_cooldown,
                frame_delay: config.speed.enemy_frame_delay,
            },
            seed: config.seed,
            entities: vec![],
            links: LinkTable::new(),
            state: GameState::Playing,
            controlled: 0,
            teleport: Teleport::Idle,
            rng: Pcg32::seed_from_u64(config.seed),
            tick: 0,
        };
        session.populate()?;
        log::info!(
            "level '{}' loaded: {} entities, {} links",
            session.level.name,
            session.entities.len(),
            session.links.pairs().len(),
        );
        Ok(session)
    }

    /// Rebuild entities, links and state from the stored level.
    pub fn restart(&mut self) {
        if let Err(e) = self.populate() {
            // Spawns were validated in `new`.
            log::error!("restart failed: {e}");
        }
        log::info!("level '{}' restarted", self.level.name);
    }

    fn populate(&mut self) -> Result<(), LevelError> {
        let tile = self.board.tile_size;
        let mut entities = Vec::with_capacity(self.level.spawns.len());

        for (n, spawn) in self.level.spawns.iter().enumerate() {
            let id = EntityId(n as u32);
            let (kind, speed) = match TileCode::classify(spawn.code) {
                TileCode::Character(role) => (EntityKind::Character(Character::new(role)), self.speed.character_speed),
                TileCode::Crate(variant) => (EntityKind::Crate { variant }, self.speed.crate_speed),
                TileCode::Key => (EntityKind::Key, self.speed.crate_speed),
                TileCode::Chest => (EntityKind::Chest, self.speed.crate_speed),
                TileCode::Enemy(preset) => (
                    EntityKind::Enemy(Enemy::new(preset, spawn.col, spawn.row)),
                    self.speed.enemy_speed,
                ),
                TileCode::Button { id, mode } => (EntityKind::Button(Button::new(id, mode)), 0),
                TileCode::Spike { id } => (EntityKind::Spike(Spike { id, extended: true }), 0),
                _ => return Err(LevelError::NotASpawn { code: spawn.code, col: spawn.col, row: spawn.row }),
            };
            entities.push(Entity::new(id, kind, spawn.col, spawn.row, tile, speed));
        }

        self.entities = entities;
        self.links = LinkTable::from_pairs(&self.level.links);
        self.state = GameState::Playing;
        self.controlled = 0;
        self.teleport = Teleport::Idle;
        self.rng = Pcg32::seed_from_u64(self.seed);
        self.tick = 0;
        Ok(())
    }
}

fn validate(level: &LevelData, board: &BoardConfig) -> Result<(), LevelError> {
    let rows = level.codes.len();
    let cols = level.codes.first().map_or(0, |r| r.len());
    if rows == 0 || cols == 0 {
        return Err(LevelError::Empty);
    }
    for (row, line) in level.codes.iter().enumerate() {
        if line.len() != cols {
            return Err(LevelError::RaggedRow { row, found: line.len(), expected: cols });
        }
    }
    if (cols, rows) != (board.cols, board.rows) {
        return Err(LevelError::BoardMismatch {
            cols,
            rows,
            expected_cols: board.cols,
            expected_rows: board.rows,
        });
    }
    for s in &level.spawns {
        if s.col < 0 || s.row < 0 || s.col as usize >= cols || s.row as usize >= rows {
            return Err(LevelError::SpawnOutOfBounds { code: s.code, col: s.col, row: s.row });
        }
        if !TileCode::classify(s.code).is_spawn_marker() {
            return Err(LevelError::NotASpawn { code: s.code, col: s.col, row: s.row });
        }
    }
    Ok(())
}

// ── Queries ──

impl LevelSession {
    pub fn state(&self) -> GameState { self.state }
    pub fn name(&self) -> &str { &self.level.name }
    pub fn grid(&self) -> &Grid { &self.grid }
    pub fn board(&self) -> BoardConfig { self.board }
    pub fn entities(&self) -> &[Entity] { &self.entities }
    pub fn links(&self) -> &LinkTable { &self.links }
    pub fn teleport(&self) -> &Teleport { &self.teleport }
    pub fn tick(&self) -> u64 { self.tick }

    /// Index of the controlled character among all characters.
    pub fn controlled_index(&self) -> usize { self.controlled }

    fn character_indices(&self) -> Vec<usize> {
        self.entities.iter().enumerate()
            .filter(|(_, e)| e.role().is_some())
            .map(|(i, _)| i)
            .collect()
    }

    /// Entity index of the controlled character.
    fn controlled_entity(&self) -> Option<usize> {
        self.character_indices().get(self.controlled).copied()
    }

    pub fn controlled_character(&self) -> Option<&Entity> {
        self.controlled_entity().map(|i| &self.entities[i])
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    fn board_view(&self) -> Board<'_> {
        Board { grid: &self.grid, tile: self.board.tile_size }
    }

    /// Is `mover` allowed to step into (col, row)?
    pub fn can_enter(&self, mover: EntityId, col: i32, row: i32) -> bool {
        match self.entities.iter().position(|e| e.id == mover) {
            Some(i) => resolver::can_enter(&self.board_view(), &self.entities, i, col, row),
            None => false,
        }
    }
}

// ── Tick ──

impl LevelSession {
    pub fn update(&mut self, input: FrameInput) -> Vec<GameEvent> {
        if self.state != GameState::Playing { return vec![]; }

        let mut events = vec![];
        self.tick += 1;

        self.handle_input(input, &mut events);
        if self.state != GameState::Playing { return events; }

        self.advance_motion();
        self.run_enemies(&mut events);
        self.resolve_contacts(&mut events);
        if self.state != GameState::Playing { return events; }

        self.resolve_hazards(&mut events);
        if self.state != GameState::Playing { return events; }

        events.extend(self.check_end_state());
        events
    }

    // ── Phase 0: input ──

    fn handle_input(&mut self, input: FrameInput, events: &mut Vec<GameEvent>) {
        if input.cancel && self.teleport.is_active() {
            self.teleport.cancel();
            events.push(GameEvent::TeleportCancelled);
            return;
        }

        if input.switch_character {
            let count = self.character_indices().len();
            if count > 0 {
                if self.teleport.is_active() {
                    self.teleport.cancel();
                    events.push(GameEvent::TeleportCancelled);
                }
                self.controlled = (self.controlled + 1) % count;
                events.push(GameEvent::SwitchedCharacter { index: self.controlled });
            }
        }

        let Some(me) = self.controlled_entity() else { return };
        if !self.entities[me].is_active() { return; }

        if input.teleport {
            self.handle_teleport(me, events);
        }

        let Some(dir) = input.movement else { return };
        if self.teleport.is_active() {
            let board = Board { grid: &self.grid, tile: self.board.tile_size };
            self.teleport.move_cursor(dir, &board);
            return;
        }
        self.move_controlled(me, dir, events);
    }

    fn handle_teleport(&mut self, me: usize, events: &mut Vec<GameEvent>) {
        let tile = self.board.tile_size;
        if !self.teleport.is_active() {
            if self.entities[me].role() == Some(Role::Caster) && !self.entities[me].body.moving_to_target {
                self.teleport.begin(self.entities[me].body.cell(tile));
                events.push(GameEvent::TeleportStarted);
            }
            return;
        }

        let board = Board { grid: &self.grid, tile };
        match self.teleport.confirm(&board, &mut self.entities) {
            Confirm::Rejected => {}
            Confirm::Selected(id) => events.push(GameEvent::TeleportTargetSelected { id }),
            Confirm::Teleported { id, col, row } => {
                events.push(GameEvent::Teleported { id, col, row });
            }
        }
    }

    fn move_controlled(&mut self, me: usize, dir: Dir, events: &mut Vec<GameEvent>) {
        let (dx, dy) = dir.delta();
        let board = Board { grid: &self.grid, tile: self.board.tile_size };
        let id = self.entities[me].id;

        match resolver::attempt_move(&board, &mut self.entities, me, dx, dy) {
            MoveOutcome::Moved { col, row, pushed, killed } => {
                if let Some(k) = killed {
                    events.push(GameEvent::EnemyKilled { id: self.entities[k].id, by: id });
                }
                for p in &pushed {
                    events.push(GameEvent::EntityPushed { id: self.entities[p.idx].id, col: p.col, row: p.row });
                }
                events.push(GameEvent::CharacterMoved { id, col, row });
                self.check_spike(me, events);
            }
            MoveOutcome::Died { enemy } => {
                let by = self.entities[enemy].id;
                self.lose(id, DeathCause::Enemy(by), events);
            }
            MoveOutcome::Blocked | MoveOutcome::Ignored => {}
        }
    }

    // ── Phase 1: interpolation ──

    fn advance_motion(&mut self) {
        for e in self.entities.iter_mut().filter(|e| e.is_active()) {
            e.body.interpolate();
            let moving = e.body.moving_to_target;
            if let EntityKind::Character(c) = &mut e.kind {
                c.animate(moving);
            }
        }
    }

    // ── Phase 2: enemies ──

    fn run_enemies(&mut self, events: &mut Vec<GameEvent>) {
        let notes = ai::run(&self.grid, self.board.tile_size, &mut self.entities, self.ai, &mut self.rng);
        for note in notes {
            events.push(match note {
                AiNote::Spotted { enemy, target } => GameEvent::EnemySpotted {
                    id: self.entities[enemy].id,
                    target: self.entities[target].id,
                },
                AiNote::LostTarget { enemy } => GameEvent::EnemyLostTarget { id: self.entities[enemy].id },
            });
        }
    }

    // ── Phase 3: contact ──

    fn resolve_contacts(&mut self, events: &mut Vec<GameEvent>) {
        for i in 0..self.entities.len() {
            if !self.entities[i].is_active() { continue; }
            let Some(role) = self.entities[i].role() else { continue };
            let hitbox = self.entities[i].body.world_hitbox();

            let hit = self.entities.iter().position(|e| {
                e.is_active() && e.is_enemy() && e.body.world_hitbox().intersects(&hitbox)
            });
            let Some(j) = hit else { continue };

            let (me, enemy) = (self.entities[i].id, self.entities[j].id);
            if role == Role::Brute {
                self.entities[j].body.active = false;
                log::debug!("brute {me:?} crushed enemy {enemy:?}");
                events.push(GameEvent::EnemyKilled { id: enemy, by: me });
            } else {
                self.entities[i].body.active = false;
                self.lose(me, DeathCause::Enemy(enemy), events);
                return;
            }
        }
    }

    // ── Phase 4: hazards ──

    fn resolve_hazards(&mut self, events: &mut Vec<GameEvent>) {
        for change in hazard::evaluate_buttons(&mut self.entities, &self.links) {
            events.push(GameEvent::ButtonChanged { button: change.button, pressed: change.pressed });
        }
        for i in 0..self.entities.len() {
            if self.check_spike(i, events) { return; }
        }
    }

    /// Kill entity `i` if it stands on an extended spike. True on death.
    fn check_spike(&mut self, i: usize, events: &mut Vec<GameEvent>) -> bool {
        if hazard::lethal_spike(&self.entities, i).is_none() { return false; }
        self.entities[i].body.active = false;
        let id = self.entities[i].id;
        self.lose(id, DeathCause::Spike, events);
        true
    }

    fn lose(&mut self, id: EntityId, cause: DeathCause, events: &mut Vec<GameEvent>) {
        self.teleport.cancel();
        self.state = GameState::Lost;
        log::info!("character {id:?} died ({cause:?}); level lost");
        events.push(GameEvent::CharacterKilled { id, cause });
        events.push(GameEvent::Lost);
    }

    // ── Phase 5: win / key destruction ──

    /// Key ↔ chest and key ↔ spike checks. Consumed and destroyed keys are
    /// removed from the entity list here. Calling it again on an unchanged
    /// session changes nothing.
    pub fn check_end_state(&mut self) -> Vec<GameEvent> {
        let mut events = vec![];
        if self.state != GameState::Playing { return events; }
        let tile = self.board.tile_size;

        for k in 0..self.entities.len() {
            if !self.entities[k].is_active() || !matches!(self.entities[k].kind, EntityKind::Key) {
                continue;
            }
            let key_box = self.entities[k].body.world_hitbox();
            let delivered = self.entities.iter().any(|e| {
                e.is_active() && matches!(e.kind, EntityKind::Chest) && e.body.world_hitbox().intersects(&key_box)
            });

            if delivered {
                self.entities[k].body.active = false;
                self.state = GameState::Won;
                log::info!("key delivered; level '{}' won", self.level.name);
                events.push(GameEvent::Won);
                break;
            }
            if hazard::spike_on_tile(&self.entities, k, tile).is_some() {
                self.entities[k].body.active = false;
                log::info!("key {:?} destroyed by spikes", self.entities[k].id);
                events.push(GameEvent::KeyDestroyed { id: self.entities[k].id });
            }
        }

        self.entities.retain(|e| e.is_active() || !matches!(e.kind, EntityKind::Key));
        events
    }
}

// ── Render state ──

impl LevelSession {
    pub fn render_state(&self) -> RenderState {
        let controlled = self.controlled_entity();
        let mut entities: Vec<RenderEntity> = self.entities.iter().enumerate()
            .filter(|(_, e)| e.is_active())
            .map(|(i, e)| {
                let (frame, armed, chasing) = match &e.kind {
                    EntityKind::Character(c) => (c.anim.frame, false, false),
                    EntityKind::Enemy(en) => (en.anim.frame, false, en.is_chasing()),
                    EntityKind::Button(b) => (0, b.pressed, false),
                    EntityKind::Spike(s) => (0, s.extended, false),
                    _ => (0, false, false),
                };
                RenderEntity {
                    id: e.id,
                    tag: e.tag(),
                    role: e.role(),
                    x: e.body.x,
                    y: e.body.y,
                    hitbox: e.body.world_hitbox(),
                    facing: e.body.facing,
                    frame,
                    armed,
                    chasing,
                    controlled: Some(i) == controlled,
                }
            })
            .collect();

        entities.sort_by_key(|r| (r.tag.render_layer(), r.hitbox.bottom()));

        RenderState {
            state: self.state,
            entities,
            cursor: self.teleport.cursor(),
            selected: self.teleport.selected(),
        }
    }
}
