/// Entities: one shared body plus a closed set of variants.
///
/// Every entity carries the same `Body` (pixel position, grid target,
/// interpolation, hitbox). Variant behaviour hangs off `EntityKind`, and the
/// collision policy of each variant comes from a capability table keyed by
/// the variant tag rather than from per-type checks scattered through the
/// resolver.

use super::geom::Rect;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EntityId(pub u32);

/// Sprite facing. Only horizontal moves change it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Facing {
    Left,
    Right,
}

/// Grid step direction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Dir {
    Up,
    Down,
    Left,
    Right,
}

impl Dir {
    pub fn delta(self) -> (i32, i32) {
        match self {
            Dir::Up => (0, -1),
            Dir::Down => (0, 1),
            Dir::Left => (-1, 0),
            Dir::Right => (1, 0),
        }
    }

    pub fn reversed(self) -> Dir {
        match self {
            Dir::Up => Dir::Down,
            Dir::Down => Dir::Up,
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Dir::Left | Dir::Right)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    /// Kills enemies on contact.
    Brute,
    /// Immune to spikes, invisible to enemies.
    Stealth,
    /// Can teleport nearby entities.
    Caster,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Brute => "brute",
            Role::Stealth => "stealth",
            Role::Caster => "caster",
        }
    }

    /// (idle, moving) animation periods in ticks.
    fn anim_periods(self) -> (u32, u32) {
        match self {
            Role::Brute => (20, 10),
            Role::Stealth => (10, 5),
            Role::Caster => (25, 15),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EnemyPreset {
    Roaming,
    Stationary,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ButtonMode {
    Hold,
    Toggle,
}

/// Enemy AI state. `Sliding` is not stored: an enemy is sliding whenever
/// its body is moving toward a target.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AiState {
    Patrolling,
    Chasing,
    ReturningHome,
}

// ── Shared body ──

#[derive(Clone, Debug)]
pub struct Body {
    pub x: i32,
    pub y: i32,
    pub target_x: i32,
    pub target_y: i32,
    pub moving_to_target: bool,
    pub speed: i32,
    /// false = removed from simulation: not drawn, not collided.
    pub active: bool,
    /// Local hitbox, offset from (x, y).
    pub hitbox: Rect,
    pub facing: Facing,
}

impl Body {
    pub fn at_cell(col: i32, row: i32, tile: i32, speed: i32, hitbox: Rect) -> Self {
        let x = col * tile;
        let y = row * tile;
        Body {
            x, y,
            target_x: x,
            target_y: y,
            moving_to_target: false,
            speed,
            active: true,
            hitbox,
            facing: Facing::Right,
        }
    }

    pub fn world_hitbox(&self) -> Rect {
        self.hitbox.translate(self.x, self.y)
    }

    /// Where the hitbox would be with the body's top-left at (x, y).
    pub fn predicted_hitbox(&self, x: i32, y: i32) -> Rect {
        self.hitbox.translate(x, y)
    }

    /// Cell containing the body's centre.
    pub fn cell(&self, tile: i32) -> (i32, i32) {
        ((self.x + tile / 2).div_euclid(tile), (self.y + tile / 2).div_euclid(tile))
    }

    /// Cell the body is heading to (equal to `cell` when idle).
    pub fn target_cell(&self, tile: i32) -> (i32, i32) {
        ((self.target_x + tile / 2).div_euclid(tile), (self.target_y + tile / 2).div_euclid(tile))
    }

    /// Commit a grid target and start sliding toward it.
    pub fn set_target_cell(&mut self, col: i32, row: i32, tile: i32) {
        self.target_x = col * tile;
        self.target_y = row * tile;
        self.moving_to_target = (self.target_x, self.target_y) != (self.x, self.y);
    }

    /// Snap onto a cell immediately, cancelling any slide.
    pub fn place_at_cell(&mut self, col: i32, row: i32, tile: i32) {
        self.x = col * tile;
        self.y = row * tile;
        self.target_x = self.x;
        self.target_y = self.y;
        self.moving_to_target = false;
    }

    /// Advance one tick toward the target, clamped so it never overshoots.
    pub fn interpolate(&mut self) {
        if !self.moving_to_target { return; }

        if self.x < self.target_x {
            self.x = self.target_x.min(self.x + self.speed);
        } else if self.x > self.target_x {
            self.x = self.target_x.max(self.x - self.speed);
        }

        if self.y < self.target_y {
            self.y = self.target_y.min(self.y + self.speed);
        } else if self.y > self.target_y {
            self.y = self.target_y.max(self.y - self.speed);
        }

        if self.x == self.target_x && self.y == self.target_y {
            self.moving_to_target = false;
        }
    }

    pub fn face_toward(&mut self, dx: i32) {
        if dx < 0 { self.facing = Facing::Left; }
        if dx > 0 { self.facing = Facing::Right; }
    }
}

// ── Hitbox presets (scaled from a 48px tile) ──

/// Characters, enemies, crates, keys, chests.
pub fn default_hitbox(tile: i32) -> Rect {
    Rect::new(tile / 6, tile / 3, tile * 2 / 3, tile * 2 / 3)
}

pub fn button_hitbox(tile: i32) -> Rect {
    Rect::new(tile / 12, tile / 8, tile / 2, tile / 4)
}

pub fn spike_hitbox(tile: i32) -> Rect {
    Rect::new(tile / 6, tile / 6, tile / 3, tile / 3)
}

// ── Animation ──

#[derive(Clone, Copy, Debug, Default)]
pub struct AnimCounter {
    pub counter: u32,
    pub frame: u32,
}

impl AnimCounter {
    /// Count one tick; returns true when the period elapsed.
    fn tick(&mut self, period: u32) -> bool {
        self.counter += 1;
        if self.counter > period {
            self.counter = 0;
            true
        } else {
            false
        }
    }
}

// ── Variants ──

#[derive(Clone, Debug)]
pub struct Character {
    pub role: Role,
    pub anim: AnimCounter,
}

impl Character {
    pub fn new(role: Role) -> Self {
        Character { role, anim: AnimCounter { counter: 0, frame: 1 } }
    }

    /// Frames 1..=3: idle alternates 1/2, walking alternates 1/3.
    pub fn animate(&mut self, moving: bool) {
        let (idle, walk) = self.role.anim_periods();
        if moving {
            if self.anim.tick(walk) {
                self.anim.frame = if self.anim.frame == 1 { 3 } else { 1 };
            }
        } else if self.anim.tick(idle) {
            self.anim.frame = if self.anim.frame == 1 { 2 } else { 1 };
        }
    }
}

#[derive(Clone, Debug)]
pub struct Enemy {
    pub preset: EnemyPreset,
    pub state: AiState,
    /// Spawn cell; patrol leash and return-home anchor.
    pub home: (i32, i32),
    /// Patrol heading, rolled on the first patrol decision.
    pub patrol_dir: Option<Dir>,
    /// Idle ticks left before the next decision.
    pub move_timer: u32,
    pub anim: AnimCounter,
}

pub const ENEMY_FRAMES: u32 = 4;

impl Enemy {
    pub fn new(preset: EnemyPreset, col: i32, row: i32) -> Self {
        Enemy {
            preset,
            state: AiState::Patrolling,
            home: (col, row),
            patrol_dir: None,
            move_timer: 0,
            anim: AnimCounter::default(),
        }
    }

    pub fn is_chasing(&self) -> bool {
        self.state == AiState::Chasing
    }

    /// Sliding animates at `delay`, idle at twice that.
    pub fn animate(&mut self, sliding: bool, delay: u32) {
        let period = if sliding { delay } else { delay * 2 };
        if self.anim.tick(period.saturating_sub(1)) {
            self.anim.frame = (self.anim.frame + 1) % ENEMY_FRAMES;
        }
    }
}

#[derive(Clone, Debug)]
pub struct Button {
    pub id: u32,
    pub mode: ButtonMode,
    pub pressed: bool,
    /// Overlap as seen on the previous tick (rising-edge detection).
    pub was_overlapped: bool,
}

impl Button {
    pub fn new(id: u32, mode: ButtonMode) -> Self {
        Button { id, mode, pressed: false, was_overlapped: false }
    }
}

#[derive(Clone, Debug)]
pub struct Spike {
    pub id: u32,
    /// Extended spikes are lethal; retracted ones are harmless floor.
    pub extended: bool,
}

#[derive(Clone, Debug)]
pub enum EntityKind {
    Character(Character),
    Enemy(Enemy),
    Crate { variant: u8 },
    Key,
    Chest,
    Button(Button),
    Spike(Spike),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EntityTag {
    Character,
    Enemy,
    Crate,
    Key,
    Chest,
    Button,
    Spike,
}

/// Collision policy of a variant.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Caps {
    /// Blocks other movers (subject to `pass_through`).
    pub solid: bool,
    /// Can be displaced by a push.
    pub pushable: bool,
    /// Never blocks tile entry; overlap is resolved by contact rules instead.
    pub pass_through: bool,
}

impl EntityTag {
    pub const fn caps(self) -> Caps {
        match self {
            EntityTag::Character => Caps { solid: true, pushable: false, pass_through: false },
            EntityTag::Enemy => Caps { solid: true, pushable: false, pass_through: true },
            EntityTag::Crate => Caps { solid: true, pushable: true, pass_through: false },
            EntityTag::Key => Caps { solid: true, pushable: true, pass_through: true },
            EntityTag::Chest => Caps { solid: true, pushable: false, pass_through: true },
            EntityTag::Button | EntityTag::Spike => Caps { solid: false, pushable: false, pass_through: true },
        }
    }

    /// Draw layer: floor overlays, then props and enemies, then characters.
    pub fn render_layer(self) -> u8 {
        match self {
            EntityTag::Button | EntityTag::Spike => 0,
            EntityTag::Character => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Entity {
    pub id: EntityId,
    pub body: Body,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(id: EntityId, kind: EntityKind, col: i32, row: i32, tile: i32, speed: i32) -> Self {
        let hitbox = match kind {
            EntityKind::Button(_) => button_hitbox(tile),
            EntityKind::Spike(_) => spike_hitbox(tile),
            _ => default_hitbox(tile),
        };
        Entity { id, body: Body::at_cell(col, row, tile, speed, hitbox), kind }
    }

    pub fn tag(&self) -> EntityTag {
        match self.kind {
            EntityKind::Character(_) => EntityTag::Character,
            EntityKind::Enemy(_) => EntityTag::Enemy,
            EntityKind::Crate { .. } => EntityTag::Crate,
            EntityKind::Key => EntityTag::Key,
            EntityKind::Chest => EntityTag::Chest,
            EntityKind::Button(_) => EntityTag::Button,
            EntityKind::Spike(_) => EntityTag::Spike,
        }
    }

    pub fn caps(&self) -> Caps {
        self.tag().caps()
    }

    pub fn is_active(&self) -> bool {
        self.body.active
    }

    pub fn role(&self) -> Option<Role> {
        match &self.kind {
            EntityKind::Character(c) => Some(c.role),
            _ => None,
        }
    }

    pub fn is_enemy(&self) -> bool {
        matches!(self.kind, EntityKind::Enemy(_))
    }

    /// Active, extended spike?
    pub fn is_armed_spike(&self) -> bool {
        self.body.active && matches!(&self.kind, EntityKind::Spike(s) if s.extended)
    }
}
