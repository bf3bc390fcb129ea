/// Level sources and the parsed level record the session consumes.
///
/// ## Sources (priority order):
///   1. `levels/` directory (individual `.txt` files, sorted by filename)
///   2. Built-in embedded levels
///
/// ## Level format (`.txt`):
///   Optional: `# Level Name`
///   Optional: `@ b,s b,s ...` (button id → spike id links, repeatable)
///   Lines: map rows, space-separated integer tile codes
///
/// ## Tile codes:
///   0,1 floor    2–7 wall    10–14 water    20,21 bridge
///   8 key        9 chest     50–59 crate    80 roaming / 81 stationary enemy
///   60–64 HOLD button, 65–69 TOGGLE button (id = code − 60)
///   70–79 spike (id = code − 70)    90 brute / 91 stealth / 92 caster
///   100–114 reserved hazard overlay (walkable)

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::GameConfig;
use crate::domain::tile::TileCode;

/// Entity placement read off the tile grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpawnRecord {
    pub code: i32,
    pub col: i32,
    pub row: i32,
}

/// Everything needed to (re)build a level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelData {
    pub name: String,
    /// `codes[row][col]`
    pub codes: Vec<Vec<i32>>,
    pub spawns: Vec<SpawnRecord>,
    /// (button id, spike id)
    pub links: Vec<(u32, u32)>,
}

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("failed to read level file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: `{token}` is not a tile code or link")]
    Parse { line: usize, token: String },
    #[error("level has no map rows")]
    Empty,
    #[error("row {row} has {found} columns, expected {expected}")]
    RaggedRow { row: usize, found: usize, expected: usize },
    #[error("level is {cols}x{rows} but the board is {expected_cols}x{expected_rows}")]
    BoardMismatch {
        cols: usize,
        rows: usize,
        expected_cols: usize,
        expected_rows: usize,
    },
    #[error("spawn code {code} at ({col},{row}) is outside the grid")]
    SpawnOutOfBounds { code: i32, col: i32, row: i32 },
    #[error("code {code} at ({col},{row}) does not spawn an entity")]
    NotASpawn { code: i32, col: i32, row: i32 },
}

impl LevelData {
    /// Build from a code grid; spawn records are every spawn-marker cell in
    /// row-major order.
    pub fn from_codes(name: impl Into<String>, codes: Vec<Vec<i32>>, links: Vec<(u32, u32)>) -> Self {
        let mut spawns = vec![];
        for (row, line) in codes.iter().enumerate() {
            for (col, &code) in line.iter().enumerate() {
                if TileCode::classify(code).is_spawn_marker() {
                    spawns.push(SpawnRecord { code, col: col as i32, row: row as i32 });
                }
            }
        }
        LevelData { name: name.into(), codes, spawns, links }
    }
}

// ══════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════

/// All playable levels: the levels directory if it yields any, else the
/// embedded set.
pub fn load_levels(config: &GameConfig) -> Vec<LevelData> {
    let dir = &config.levels_dir;
    if dir.is_dir() {
        let levels = load_from_directory(dir);
        if !levels.is_empty() {
            log::info!("loaded {} levels from {}", levels.len(), dir.display());
            return levels;
        }
    }
    embedded_levels()
}

/// Parse a single level from text.
pub fn parse_level(content: &str) -> Result<LevelData, LevelError> {
    let mut name = String::new();
    let mut rows = vec![];
    let mut links = vec![];

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() { continue; }

        if let Some(rest) = trimmed.strip_prefix('#') {
            if name.is_empty() { name = rest.trim().to_string(); }
        } else if let Some(rest) = trimmed.strip_prefix('@') {
            for pair in rest.split_whitespace() {
                links.push(parse_link(pair).ok_or_else(|| LevelError::Parse {
                    line: line_no,
                    token: pair.to_string(),
                })?);
            }
        } else {
            let row = trimmed.split_whitespace()
                .map(|tok| tok.parse::<i32>().map_err(|_| LevelError::Parse {
                    line: line_no,
                    token: tok.to_string(),
                }))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }
    }

    if rows.is_empty() {
        return Err(LevelError::Empty);
    }
    if name.is_empty() {
        name = "Untitled".to_string();
    }
    Ok(LevelData::from_codes(name, rows, links))
}

fn parse_link(pair: &str) -> Option<(u32, u32)> {
    let (b, s) = pair.split_once(',')?;
    Some((b.trim().parse().ok()?, s.trim().parse().ok()?))
}

pub fn load_level_file(path: &Path) -> Result<LevelData, LevelError> {
    let content = std::fs::read_to_string(path).map_err(|source| LevelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut level = parse_level(&content)?;
    if level.name == "Untitled" {
        if let Some(stem) = path.file_stem() {
            level.name = stem.to_string_lossy().to_string();
        }
    }
    Ok(level)
}

// ══════════════════════════════════════════════════════════════
// Directory loading (individual .txt files)
// ══════════════════════════════════════════════════════════════

fn load_from_directory(dir: &Path) -> Vec<LevelData> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("cannot list {}: {e}", dir.display());
            return vec![];
        }
    };

    let mut paths: Vec<PathBuf> = entries.flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|e| e == "txt"))
        .collect();
    paths.sort();

    paths.iter()
        .filter_map(|path| match load_level_file(path) {
            Ok(level) => Some(level),
            Err(e) => {
                log::warn!("skipping level: {e}");
                None
            }
        })
        .collect()
}

// ══════════════════════════════════════════════════════════════
// Embedded fallback levels
// ══════════════════════════════════════════════════════════════
//
// Legend: '#' wall  '~' water  '=' bridge  '.' floor
//         'B' brute  'S' stealth  'C' caster  'x' crate  'k' key  'h' chest
//         'E' roaming enemy  'G' stationary enemy
//         'a'..'e' HOLD button 0..4  'f'..'j' TOGGLE button 5..9
//         '0'..'9' spike 0..9

pub fn embedded_levels() -> Vec<LevelData> {
    vec![
        make_embedded("Courtyard", &[], &[
            "################",
            "#..............#",
            "#.B............#",
            "#......k.......#",
            "#..............#",
            "#...####.####..#",
            "#..............#",
            "#..x.......E...#",
            "#..............#",
            "#.......h......#",
            "#..............#",
            "################",
        ]),
        make_embedded("Spike Hall", &[(0, 0)], &[
            "################",
            "#B.....#.......#",
            "#..x...#...S...#",
            "#......#.......#",
            "#..a...0.....G.#",
            "#......#.......#",
            "#......#..k....#",
            "#......#.......#",
            "#......#.......#",
            "#......#...h...#",
            "#......#.......#",
            "################",
        ]),
        make_embedded("Flooded Study", &[(5, 1)], &[
            "################",
            "#C.....~.......#",
            "#......~.......#",
            "#......~...k...#",
            "#......=.......#",
            "#..x...~..G....#",
            "#......~.......#",
            "#......~.......#",
            "#......~~~=~~~~#",
            "#..f...~.......#",
            "#......~..1h1..#",
            "################",
        ]),
    ]
}

fn legend(ch: char) -> i32 {
    match ch {
        '#' => 2,
        '~' => 10,
        '=' => 20,
        'k' => 8,
        'h' => 9,
        'x' => 50,
        'E' => 80,
        'G' => 81,
        'B' => 90,
        'S' => 91,
        'C' => 92,
        'a'..='j' => 60 + (ch as i32 - 'a' as i32),
        '0'..='9' => 70 + (ch as i32 - '0' as i32),
        _ => 0,
    }
}

fn make_embedded(name: &str, links: &[(u32, u32)], map: &[&str]) -> LevelData {
    let codes = map.iter().map(|row| row.chars().map(legend).collect()).collect();
    LevelData::from_codes(name, codes, links.to_vec())
}
