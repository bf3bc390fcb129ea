/// Terminal host: owns the level list, drives one LevelSession at a fixed
/// tick rate and draws it between ticks.

mod ui;

use std::fs::File;
use std::time::{Duration, Instant};

use keyward::config::GameConfig;
use keyward::domain::entity::EntityId;
use keyward::sim::event::{DeathCause, GameEvent};
use keyward::sim::level::{load_levels, LevelData};
use keyward::sim::session::LevelSession;
use ui::input::{HostAction, Keyboard};
use ui::renderer::{Hud, Renderer};

const FRAME_SLEEP: Duration = Duration::from_millis(5);

/// Raw mode owns the terminal, so log lines go to a file instead of stderr.
const LOG_FILE: &str = "keyward.log";

fn main() {
    init_logging();
    let config = GameConfig::load();
    let levels = load_levels(&config);

    let Some(mut game) = Game::start(levels, &config) else {
        eprintln!("No playable levels found.");
        return;
    };

    let mut renderer = Renderer::new();
    if let Err(e) = renderer.init() {
        eprintln!("Terminal init failed: {e}");
        return;
    }

    let result = game_loop(&mut game, &mut renderer, &config);

    if let Err(e) = renderer.cleanup() {
        eprintln!("Terminal cleanup failed: {e}");
    }
    if let Err(e) = result {
        eprintln!("Game error: {e}");
    }

    println!();
    println!("Thanks for playing Keyward!");
    println!("Levels cleared: {}/{}", game.cleared.len(), game.levels.len());
}

fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    match File::create(LOG_FILE) {
        Ok(file) => env_logger::Builder::from_env(env)
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init(),
        Err(e) => eprintln!("logging disabled, cannot create {LOG_FILE}: {e}"),
    }
}

fn game_loop(
    game: &mut Game,
    renderer: &mut Renderer,
    config: &GameConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut kb = Keyboard::new();
    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(config.speed.tick_rate_ms);

    loop {
        kb.poll();

        match kb.host_action() {
            Some(HostAction::Quit) => break,
            Some(HostAction::Restart) => game.restart(),
            Some(HostAction::NextLevel) => game.advance(config),
            None => {}
        }

        if last_tick.elapsed() >= tick_rate {
            // Held keys would race the teleport cursor across the board.
            let repeat = !game.session.teleport().is_active();
            let events = game.session.update(kb.take_frame(repeat));
            game.absorb(&events);
            last_tick = Instant::now();
        }

        let hud = Hud {
            level_index: game.index,
            level_count: game.levels.len(),
            status: &game.status,
        };
        renderer.render(&game.session, &hud)?;
        std::thread::sleep(FRAME_SLEEP);
    }

    Ok(())
}

// ── Level flow ──

struct Game {
    levels: Vec<LevelData>,
    index: usize,
    session: LevelSession,
    status: String,
    /// Indices of levels won at least once.
    cleared: Vec<usize>,
}

impl Game {
    fn start(levels: Vec<LevelData>, config: &GameConfig) -> Option<Self> {
        let (index, session) = open_from(&levels, 0, config)?;
        let status = format!("Bring the key to the chest. ({})", session.name());
        Some(Game { levels, index, session, status, cleared: vec![] })
    }

    fn restart(&mut self) {
        self.session.restart();
        self.status = "Level restarted".into();
    }

    fn advance(&mut self, config: &GameConfig) {
        if let Some((index, session)) = open_from(&self.levels, self.index + 1, config) {
            log::info!("entering level {} ({})", index + 1, session.name());
            self.status = format!("Level {}: {}", index + 1, session.name());
            self.index = index;
            self.session = session;
        }
    }

    fn absorb(&mut self, events: &[GameEvent]) {
        for event in events {
            if *event == GameEvent::Won && !self.cleared.contains(&self.index) {
                self.cleared.push(self.index);
            }
            if let Some(text) = describe(event, &self.session) {
                self.status = text;
            }
        }
    }
}

/// First level at or after `start` (wrapping) that builds a session.
/// Broken levels are logged and skipped.
fn open_from(levels: &[LevelData], start: usize, config: &GameConfig) -> Option<(usize, LevelSession)> {
    let count = levels.len();
    (0..count)
        .map(|k| (start + k) % count)
        .find_map(|i| match LevelSession::new(levels[i].clone(), config) {
            Ok(session) => Some((i, session)),
            Err(e) => {
                log::error!("level {} ({}) rejected: {e}", i + 1, levels[i].name);
                None
            }
        })
}

/// Status-line text for an event, if it deserves one.
fn describe(event: &GameEvent, session: &LevelSession) -> Option<String> {
    let role_of = |id: EntityId| {
        session.entity(id)
            .and_then(|e| e.role())
            .map_or("character", |r| r.name())
    };
    let text = match event {
        GameEvent::EnemyKilled { by, .. } => format!("The {} crushed an enemy", role_of(*by)),
        GameEvent::CharacterKilled { id, cause: DeathCause::Enemy(_) } => {
            format!("The {} was caught", role_of(*id))
        }
        GameEvent::CharacterKilled { id, cause: DeathCause::Spike } => {
            format!("The {} stepped on spikes", role_of(*id))
        }
        GameEvent::EnemySpotted { .. } => "An enemy spotted you!".into(),
        GameEvent::ButtonChanged { pressed: true, .. } => "Click. The spikes retract".into(),
        GameEvent::ButtonChanged { pressed: false, .. } => "The spikes rise again".into(),
        GameEvent::KeyDestroyed { .. } => "The key was shattered by spikes".into(),
        GameEvent::SwitchedCharacter { .. } => {
            let role = session.controlled_character().and_then(|e| e.role());
            format!("Now controlling the {}", role.map_or("character", |r| r.name()))
        }
        GameEvent::TeleportStarted => "Teleport: pick a character, crate or key".into(),
        GameEvent::TeleportTargetSelected { .. } => "Teleport: pick a destination".into(),
        GameEvent::Teleported { .. } => "Teleported".into(),
        GameEvent::TeleportCancelled => "Teleport cancelled".into(),
        GameEvent::Won => "The chest is open!".into(),
        GameEvent::Lost => "Level lost".into(),
        _ => return None,
    };
    Some(text)
}
