/// Tunables: tick rate, slide speeds, board geometry, AI ranges, RNG seed.
///
/// `config.toml` is looked up next to the executable first, then in the
/// working directory. Every key is optional; a broken file is reported and
/// ignored as a whole.

use serde::Deserialize;
use std::path::PathBuf;

/// Seed used for patrol direction rolls when `general.seed` is unset.
/// Fixed so that two runs of the same level play out identically.
pub const DEFAULT_SEED: u64 = 0x6b65_7977_6172_64;

// ── Runtime config ──

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub speed: SpeedConfig,
    pub board: BoardConfig,
    pub ai: AiConfig,
    pub levels_dir: PathBuf,
    pub seed: u64,
}

#[derive(Clone, Debug)]
pub struct SpeedConfig {
    pub tick_rate_ms: u64,
    pub character_speed: i32,   // pixels per tick while sliding
    pub crate_speed: i32,       // crates and keys
    pub enemy_speed: i32,
    pub enemy_move_cooldown: u32, // idle ticks between two enemy decisions
    pub enemy_frame_delay: u32,
}

/// Board geometry. Fixed for the lifetime of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoardConfig {
    pub tile_size: i32,
    pub cols: usize,
    pub rows: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct AiConfig {
    pub detect_range: u32,    // tiles, Euclidean
    pub patrol_distance: u32, // tiles from spawn along the patrol axis
}

// ── File schema ──

#[derive(Deserialize, Debug, Default)]
struct TomlConfig {
    #[serde(default)]
    speed: TomlSpeed,
    #[serde(default)]
    board: TomlBoard,
    #[serde(default)]
    ai: TomlAi,
    #[serde(default)]
    general: TomlGeneral,
}

#[derive(Deserialize, Debug)]
struct TomlSpeed {
    #[serde(default = "default_tick_rate")]
    tick_rate_ms: u64,
    #[serde(default = "default_character_speed")]
    character_speed: i32,
    #[serde(default = "default_crate_speed")]
    crate_speed: i32,
    #[serde(default = "default_enemy_speed")]
    enemy_speed: i32,
    #[serde(default = "default_enemy_cooldown")]
    enemy_move_cooldown: u32,
    #[serde(default = "default_frame_delay")]
    enemy_frame_delay: u32,
}

#[derive(Deserialize, Debug)]
struct TomlBoard {
    #[serde(default = "default_tile_size")]
    tile_size: i32,
    #[serde(default = "default_cols")]
    cols: usize,
    #[serde(default = "default_rows")]
    rows: usize,
}

#[derive(Deserialize, Debug)]
struct TomlAi {
    #[serde(default = "default_detect_range")]
    detect_range: u32,
    #[serde(default = "default_patrol_distance")]
    patrol_distance: u32,
}

#[derive(Deserialize, Debug)]
struct TomlGeneral {
    #[serde(default = "default_levels_dir")]
    levels_dir: String,
    #[serde(default)]
    seed: Option<u64>,
}

// ── Defaults ──

fn default_tick_rate() -> u64 { 16 }     // ~60 ticks per second
fn default_character_speed() -> i32 { 4 }
fn default_crate_speed() -> i32 { 4 }
fn default_enemy_speed() -> i32 { 2 }
fn default_enemy_cooldown() -> u32 { 2 }
fn default_frame_delay() -> u32 { 6 }
fn default_tile_size() -> i32 { 48 }
fn default_cols() -> usize { 16 }
fn default_rows() -> usize { 12 }
fn default_detect_range() -> u32 { 2 }
fn default_patrol_distance() -> u32 { 3 }
fn default_levels_dir() -> String { "levels".into() }

impl Default for TomlSpeed {
    fn default() -> Self {
        TomlSpeed {
            tick_rate_ms: default_tick_rate(),
            character_speed: default_character_speed(),
            crate_speed: default_crate_speed(),
            enemy_speed: default_enemy_speed(),
            enemy_move_cooldown: default_enemy_cooldown(),
            enemy_frame_delay: default_frame_delay(),
        }
    }
}

impl Default for TomlBoard {
    fn default() -> Self {
        TomlBoard {
            tile_size: default_tile_size(),
            cols: default_cols(),
            rows: default_rows(),
        }
    }
}

impl Default for TomlAi {
    fn default() -> Self {
        TomlAi {
            detect_range: default_detect_range(),
            patrol_distance: default_patrol_distance(),
        }
    }
}

impl Default for TomlGeneral {
    fn default() -> Self {
        TomlGeneral {
            levels_dir: default_levels_dir(),
            seed: None,
        }
    }
}

// ── Loading ──

impl Default for GameConfig {
    /// Built-in defaults, no filesystem access.
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), PathBuf::from(default_levels_dir()))
    }
}

impl GameConfig {
    /// Read `config.toml` from the first search directory that has one.
    /// A relative `levels_dir` resolves against the same directories.
    pub fn load() -> Self {
        let dirs = search_dirs();
        let file = read_config(&dirs);
        let levels_dir = resolve_levels_dir(&file.general.levels_dir, &dirs);
        Self::from_toml(file, levels_dir)
    }

    /// Parse a config document. Unknown keys are ignored, missing keys defaulted.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let cfg = toml::from_str::<TomlConfig>(text)?;
        let dir = PathBuf::from(&cfg.general.levels_dir);
        Ok(Self::from_toml(cfg, dir))
    }

    fn from_toml(cfg: TomlConfig, levels_dir: PathBuf) -> Self {
        GameConfig {
            speed: SpeedConfig {
                tick_rate_ms: cfg.speed.tick_rate_ms,
                character_speed: cfg.speed.character_speed.max(1),
                crate_speed: cfg.speed.crate_speed.max(1),
                enemy_speed: cfg.speed.enemy_speed.max(1),
                enemy_move_cooldown: cfg.speed.enemy_move_cooldown,
                enemy_frame_delay: cfg.speed.enemy_frame_delay.max(1),
            },
            board: BoardConfig {
                tile_size: cfg.board.tile_size.max(1),
                cols: cfg.board.cols,
                rows: cfg.board.rows,
            },
            ai: AiConfig {
                detect_range: cfg.ai.detect_range,
                patrol_distance: cfg.ai.patrol_distance,
            },
            levels_dir,
            seed: cfg.general.seed.unwrap_or(DEFAULT_SEED),
        }
    }
}

/// Executable directory, then the working directory if different.
fn search_dirs() -> Vec<PathBuf> {
    let exe_dir = std::env::current_exe().ok()
        .map(|exe| exe.canonicalize().unwrap_or(exe))
        .and_then(|exe| exe.parent().map(PathBuf::from));
    let cwd = std::env::current_dir().ok();

    let mut dirs: Vec<PathBuf> = exe_dir.into_iter().collect();
    if let Some(cwd) = cwd.filter(|c| !dirs.contains(c)) {
        dirs.push(cwd);
    }
    if dirs.is_empty() {
        dirs.push(PathBuf::from("."));
    }
    dirs
}

fn read_config(dirs: &[PathBuf]) -> TomlConfig {
    let Some(path) = dirs.iter().map(|d| d.join("config.toml")).find(|p| p.is_file()) else {
        return TomlConfig::default();
    };
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("cannot read {}: {e}; using defaults", path.display());
            return TomlConfig::default();
        }
    };
    match toml::from_str::<TomlConfig>(&text) {
        Ok(cfg) => {
            log::info!("settings from {}", path.display());
            cfg
        }
        Err(e) => {
            log::warn!("{}: {e}; using defaults", path.display());
            TomlConfig::default()
        }
    }
}

fn resolve_levels_dir(name: &str, dirs: &[PathBuf]) -> PathBuf {
    let path = PathBuf::from(name);
    if path.is_absolute() {
        return path;
    }
    dirs.iter()
        .map(|d| d.join(&path))
        .find(|p| p.is_dir())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_board_of_sixteen_by_twelve() {
        let cfg = GameConfig::default();
        assert_eq!(cfg.board, BoardConfig { tile_size: 48, cols: 16, rows: 12 });
        assert_eq!(cfg.speed.character_speed, 4);
        assert_eq!(cfg.speed.enemy_speed, 2);
        assert_eq!(cfg.ai.detect_range, 2);
        assert_eq!(cfg.seed, DEFAULT_SEED);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let cfg = GameConfig::from_toml_str("[ai]\ndetect_range = 5\n[general]\nseed = 7\n").unwrap();
        assert_eq!(cfg.ai.detect_range, 5);
        assert_eq!(cfg.ai.patrol_distance, 3);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.board.tile_size, 48);
    }

    #[test]
    fn zero_speeds_are_clamped() {
        let cfg = GameConfig::from_toml_str("[speed]\nenemy_speed = 0\ncharacter_speed = -3\n").unwrap();
        assert_eq!(cfg.speed.enemy_speed, 1);
        assert_eq!(cfg.speed.character_speed, 1);
    }

    #[test]
    fn levels_dir_resolution() {
        let dirs = vec![PathBuf::from("/nonexistent-keyward")];
        assert_eq!(resolve_levels_dir("levels", &dirs), PathBuf::from("levels"));
        let abs = std::env::temp_dir();
        assert_eq!(resolve_levels_dir(&abs.to_string_lossy(), &dirs), abs);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(GameConfig::from_toml_str("[speed\n").is_err());
    }
}
