/// Presentation layer: double-buffered, diff-based terminal renderer.
///
/// Each frame is composed into `front`, compared cell by cell against
/// `back` (the previous frame), and only changed cells are emitted. All
/// commands are queued and flushed once, then the buffers swap.
///
/// Screen layout:
///   row 0          HUD (level, controlled character)
///   row 2 ..       board, two terminal columns per tile
///   below board    status line, key help
///
/// Entities are drawn at the tile containing their centre, in the order
/// `render_state()` returns them, so later entries cover earlier ones.

use std::io::{self, BufWriter, Write};

use crossterm::{
    cursor::{self, MoveTo},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};

use keyward::domain::entity::{EntityTag, Facing, Role};
use keyward::domain::teleport::Teleport;
use keyward::domain::tile::{TileCode, Terrain};
use keyward::sim::session::{GameState, LevelSession, RenderEntity};

// ── Cell ──

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Cell {
    ch: char,
    fg: Color,
    bg: Color,
}

impl Cell {
    /// Same RGB for `Clear` and every empty cell so row gaps match.
    const BASE_BG: Color = Color::Rgb { r: 22, g: 22, b: 35 };

    const BLANK: Cell = Cell { ch: ' ', fg: Color::White, bg: Cell::BASE_BG };

    /// Differs from every real cell; forces a full repaint.
    const INVALID: Cell = Cell { ch: '?', fg: Color::Magenta, bg: Color::Magenta };

    fn new(ch: char, fg: Color, bg: Color) -> Self {
        Cell { ch, fg, bg }
    }
}

// ── FrameBuffer ──

struct FrameBuffer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl FrameBuffer {
    fn new(w: usize, h: usize) -> Self {
        FrameBuffer { width: w, height: h, cells: vec![Cell::BLANK; w * h] }
    }

    fn resize(&mut self, w: usize, h: usize) {
        if self.width != w || self.height != h {
            self.width = w;
            self.height = h;
            self.cells = vec![Cell::BLANK; w * h];
        }
    }

    fn clear(&mut self) {
        self.cells.fill(Cell::BLANK);
    }

    fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = cell;
        }
    }

    fn get(&self, x: usize, y: usize) -> Cell {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x]
        } else {
            Cell::BLANK
        }
    }

    fn put_str(&mut self, x: usize, y: usize, s: &str, fg: Color, bg: Color) {
        for (i, ch) in s.chars().enumerate() {
            self.set(x + i, y, Cell::new(ch, fg, bg));
        }
    }

    /// Two-column tile at board cell (col, row).
    fn put_tile(&mut self, col: usize, row: usize, glyph: [char; 2], fg: Color, bg: Color) {
        let x = col * CELL_W;
        let y = MAP_ROW + row;
        self.set(x, y, Cell::new(glyph[0], fg, bg));
        self.set(x + 1, y, Cell::new(glyph[1], fg, bg));
    }

    fn recolor_tile_bg(&mut self, col: usize, row: usize, bg: Color) {
        for dx in 0..CELL_W {
            let (x, y) = (col * CELL_W + dx, MAP_ROW + row);
            let mut cell = self.get(x, y);
            cell.bg = bg;
            self.set(x, y, cell);
        }
    }
}

// ── Layout ──

const CELL_W: usize = 2;
const HUD_ROW: usize = 0;
const MAP_ROW: usize = 2;

const CURSOR_BG: Color = Color::Rgb { r: 140, g: 120, b: 20 };
const SELECTED_BG: Color = Color::Rgb { r: 20, g: 110, b: 130 };
const CONTROLLED_BG: Color = Color::Rgb { r: 55, g: 55, b: 80 };

/// What the host wants shown around the board.
pub struct Hud<'a> {
    pub level_index: usize,
    pub level_count: usize,
    pub status: &'a str,
}

pub struct Renderer {
    writer: BufWriter<io::Stdout>,
    front: FrameBuffer,
    back: FrameBuffer,
    term_w: usize,
    term_h: usize,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            writer: BufWriter::with_capacity(16384, io::stdout()),
            front: FrameBuffer::new(0, 0),
            back: FrameBuffer::new(0, 0),
            term_w: 0,
            term_h: 0,
        }
    }

    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            self.writer,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            SetBackgroundColor(Cell::BASE_BG),
            Clear(ClearType::All)
        )?;
        self.sync_size()?;
        Ok(())
    }

    pub fn cleanup(&mut self) -> io::Result<()> {
        execute!(self.writer, ResetColor, cursor::Show, terminal::LeaveAlternateScreen)?;
        terminal::disable_raw_mode()
    }

    /// Force the next frame to repaint every cell.
    pub fn invalidate(&mut self) {
        self.back.cells.fill(Cell::INVALID);
    }

    pub fn render(&mut self, session: &LevelSession, hud: &Hud) -> io::Result<()> {
        let (tw, th) = terminal::size().unwrap_or((80, 24));
        if tw as usize != self.term_w || th as usize != self.term_h {
            self.sync_size()?;
        }

        self.front.clear();
        compose(&mut self.front, session, hud);
        self.flush_diff()?;
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }

    fn sync_size(&mut self) -> io::Result<()> {
        let (tw, th) = terminal::size().unwrap_or((80, 24));
        self.term_w = tw as usize;
        self.term_h = th as usize;
        self.front.resize(self.term_w, self.term_h);
        self.back.resize(self.term_w, self.term_h);
        self.invalidate();
        queue!(self.writer, SetBackgroundColor(Cell::BASE_BG), Clear(ClearType::All))
    }

    fn flush_diff(&mut self) -> io::Result<()> {
        let mut last_fg = Color::White;
        let mut last_bg = Cell::BASE_BG;
        // Position of the terminal cursor after the last print, if known.
        let mut cursor_at: Option<(usize, usize)> = None;

        queue!(self.writer, SetForegroundColor(last_fg), SetBackgroundColor(last_bg))?;

        for y in 0..self.front.height {
            for x in 0..self.front.width {
                let cell = self.front.get(x, y);
                if cell == self.back.get(x, y) { continue; }

                if cursor_at != Some((x, y)) {
                    queue!(self.writer, MoveTo(x as u16, y as u16))?;
                }
                if cell.fg != last_fg {
                    queue!(self.writer, SetForegroundColor(cell.fg))?;
                    last_fg = cell.fg;
                }
                if cell.bg != last_bg {
                    queue!(self.writer, SetBackgroundColor(cell.bg))?;
                    last_bg = cell.bg;
                }
                queue!(self.writer, Print(cell.ch))?;
                cursor_at = Some((x + 1, y));
            }
        }

        self.writer.flush()
    }
}

// ══════════════════════════════════════════════════════════════
// Composition
// ══════════════════════════════════════════════════════════════

fn compose(buf: &mut FrameBuffer, session: &LevelSession, hud: &Hud) {
    let grid = session.grid();
    let (cols, rows) = (grid.width(), grid.height());
    let needed_w = cols * CELL_W;
    let needed_h = MAP_ROW + rows + 3;
    if buf.width < needed_w || buf.height < needed_h {
        let msg = format!("Terminal too small: need {needed_w}x{needed_h}");
        buf.put_str(0, 0, &msg, Color::Red, Cell::BASE_BG);
        return;
    }

    compose_hud(buf, session, hud);
    compose_terrain(buf, session);
    compose_entities(buf, session);
    compose_cursor(buf, session);

    let status_row = MAP_ROW + rows + 1;
    buf.put_str(0, status_row, hud.status, Color::Rgb { r: 230, g: 210, b: 120 }, Cell::BASE_BG);
    buf.put_str(0, status_row + 1, help_line(session), Color::DarkGrey, Cell::BASE_BG);

    match session.state() {
        GameState::Playing => {}
        GameState::Won => compose_banner(buf, needed_w, rows, "LEVEL CLEAR", "[N] next   [Y] replay", Color::Green),
        GameState::Lost => compose_banner(buf, needed_w, rows, "DEFEATED", "[Y] retry   [N] skip", Color::Red),
    }
}

fn compose_hud(buf: &mut FrameBuffer, session: &LevelSession, hud: &Hud) {
    let title = format!("KEYWARD  {}/{}  {}", hud.level_index + 1, hud.level_count, session.name());
    buf.put_str(0, HUD_ROW, &title, Color::White, Cell::BASE_BG);

    let count = session.entities().iter().filter(|e| e.role().is_some()).count();
    if let Some(role) = session.controlled_character().and_then(|e| e.role()) {
        let who = format!("{} ({}/{})", role.name().to_uppercase(), session.controlled_index() + 1, count);
        let x = title.chars().count() + 4;
        buf.put_str(x, HUD_ROW, &who, role_color(role), Cell::BASE_BG);
    }
}

fn compose_terrain(buf: &mut FrameBuffer, session: &LevelSession) {
    let grid = session.grid();
    for row in 0..grid.height() {
        for col in 0..grid.width() {
            let code = grid.code_at(col as i32, row as i32).unwrap_or(0);
            let (glyph, fg, bg) = terrain_glyph(TileCode::classify(code));
            buf.put_tile(col, row, glyph, fg, bg);
        }
    }
}

fn terrain_glyph(code: TileCode) -> ([char; 2], Color, Color) {
    match code {
        TileCode::Reserved(_) => ([':', ':'], Color::DarkGrey, Cell::BASE_BG),
        TileCode::Unknown(_) => (['?', '?'], Color::Magenta, Cell::BASE_BG),
        other => match other.terrain().unwrap_or(Terrain::Floor) {
            Terrain::Floor => ([' ', ' '], Color::White, Cell::BASE_BG),
            Terrain::Wall => (['█', '█'], Color::Rgb { r: 120, g: 120, b: 135 }, Cell::BASE_BG),
            Terrain::Water => (['~', '~'], Color::Rgb { r: 120, g: 180, b: 255 }, Color::Rgb { r: 20, g: 50, b: 110 }),
            Terrain::Bridge => (['═', '═'], Color::Rgb { r: 200, g: 150, b: 90 }, Color::Rgb { r: 70, g: 45, b: 20 }),
        },
    }
}

fn compose_entities(buf: &mut FrameBuffer, session: &LevelSession) {
    let tile = session.board().tile_size;
    let state = session.render_state();
    for e in &state.entities {
        let Some((col, row)) = tile_of(e, tile, buf) else { continue };
        let (glyph, fg) = entity_glyph(e);
        let base = buf.get(col * CELL_W, MAP_ROW + row).bg;
        let bg = if state.selected == Some(e.id) {
            SELECTED_BG
        } else if e.controlled {
            CONTROLLED_BG
        } else {
            base
        };
        buf.put_tile(col, row, glyph, fg, bg);
    }
}

/// Board cell holding the entity's centre, if it is on screen.
fn tile_of(e: &RenderEntity, tile: i32, buf: &FrameBuffer) -> Option<(usize, usize)> {
    let col = (e.x + tile / 2).div_euclid(tile);
    let row = (e.y + tile / 2).div_euclid(tile);
    let (col, row) = (usize::try_from(col).ok()?, usize::try_from(row).ok()?);
    (col * CELL_W + 1 < buf.width && MAP_ROW + row < buf.height).then_some((col, row))
}

const ENEMY_GLYPHS: [[char; 2]; 4] = [['<', '>'], ['(', ')'], ['<', '>'], ['{', '}']];

fn entity_glyph(e: &RenderEntity) -> ([char; 2], Color) {
    match e.tag {
        EntityTag::Character => {
            let role = e.role.unwrap_or(Role::Brute);
            let letter = role.name().chars().next().map_or('?', |c| c.to_ascii_uppercase());
            let arrow = if e.frame % 2 == 0 { ('◂', '▸') } else { ('◃', '▹') };
            let glyph = match e.facing {
                Facing::Left => [arrow.0, letter],
                Facing::Right => [letter, arrow.1],
            };
            (glyph, role_color(role))
        }
        EntityTag::Enemy => {
            let fg = if e.chasing { Color::Red } else { Color::Yellow };
            (ENEMY_GLYPHS[e.frame as usize % ENEMY_GLYPHS.len()], fg)
        }
        EntityTag::Crate => (['[', ']'], Color::Rgb { r: 190, g: 130, b: 70 }),
        EntityTag::Key => (['o', '╖'], Color::Rgb { r: 255, g: 215, b: 0 }),
        EntityTag::Chest => (['▄', '▄'], Color::Rgb { r: 230, g: 180, b: 40 }),
        EntityTag::Button if e.armed => (['_', '_'], Color::DarkCyan),
        EntityTag::Button => (['▁', '▁'], Color::Cyan),
        EntityTag::Spike if e.armed => (['^', '^'], Color::White),
        EntityTag::Spike => (['.', '.'], Color::DarkGrey),
    }
}

fn role_color(role: Role) -> Color {
    match role {
        Role::Brute => Color::Rgb { r: 255, g: 120, b: 80 },
        Role::Stealth => Color::Rgb { r: 120, g: 220, b: 120 },
        Role::Caster => Color::Rgb { r: 190, g: 140, b: 255 },
    }
}

fn compose_cursor(buf: &mut FrameBuffer, session: &LevelSession) {
    if let Some((col, row)) = session.teleport().cursor() {
        if let (Ok(col), Ok(row)) = (usize::try_from(col), usize::try_from(row)) {
            buf.recolor_tile_bg(col, row, CURSOR_BG);
        }
    }
}

fn help_line(session: &LevelSession) -> &'static str {
    match session.teleport() {
        Teleport::Idle => "[WASD] move  [Q] switch  [E] teleport  [Y] restart  [N] next  [Ctrl+C] quit",
        Teleport::SelectingTarget { .. } => "TELEPORT  [WASD] cursor  [E] pick target  [Esc] cancel",
        Teleport::SelectingDestination { .. } => "TELEPORT  [WASD] cursor  [E] drop here  [Esc] cancel",
    }
}

fn compose_banner(buf: &mut FrameBuffer, width: usize, rows: usize, title: &str, hint: &str, fg: Color) {
    let inner = title.len().max(hint.len()) + 4;
    let x = width.saturating_sub(inner) / 2;
    let y = MAP_ROW + rows.saturating_sub(3) / 2;
    let bg = Color::Rgb { r: 10, g: 10, b: 20 };

    let rule: String = "─".repeat(inner);
    buf.put_str(x, y, &format!("┌{rule}┐"), fg, bg);
    buf.put_str(x, y + 1, &format!("│{:^inner$}│", title), fg, bg);
    buf.put_str(x, y + 2, &format!("│{:^inner$}│", hint), Color::White, bg);
    buf.put_str(x, y + 3, &format!("└{rule}┘"), fg, bg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward::config::GameConfig;
    use keyward::sim::level::LevelData;

    fn screen(rows: &[&str]) -> (FrameBuffer, LevelSession) {
        let codes = rows.iter()
            .map(|r| r.chars().map(|c| match c {
                '#' => 2, '~' => 10, 'B' => 90, 'k' => 8, 'h' => 9, 'x' => 50, _ => 0,
            }).collect())
            .collect();
        let mut cfg = GameConfig::default();
        cfg.board.cols = rows[0].len();
        cfg.board.rows = rows.len();
        let session = LevelSession::new(LevelData::from_codes("Test", codes, vec![]), &cfg).unwrap();
        (FrameBuffer::new(80, 24), session)
    }

    fn tile_text(buf: &FrameBuffer, col: usize, row: usize) -> String {
        (0..CELL_W).map(|dx| buf.get(col * CELL_W + dx, MAP_ROW + row).ch).collect()
    }

    #[test]
    fn terrain_and_entities_land_on_their_tiles() {
        let (mut buf, session) = screen(&["#~.", "Bxk", "..h"]);
        let hud = Hud { level_index: 0, level_count: 1, status: "" };
        compose(&mut buf, &session, &hud);
        assert_eq!(tile_text(&buf, 0, 0), "██");
        assert_eq!(tile_text(&buf, 1, 0), "~~");
        assert_eq!(tile_text(&buf, 1, 1), "[]");
        assert_eq!(tile_text(&buf, 0, 1), "B▸");
        assert_eq!(buf.get(0, MAP_ROW + 1).bg, CONTROLLED_BG);
    }

    #[test]
    fn hud_names_level_and_character() {
        let (mut buf, session) = screen(&["Bkh"]);
        let hud = Hud { level_index: 1, level_count: 3, status: "hello" };
        compose(&mut buf, &session, &hud);
        let top: String = (0..40).map(|x| buf.get(x, HUD_ROW).ch).collect();
        assert!(top.starts_with("KEYWARD  2/3  Test"));
        assert!(top.contains("BRUTE (1/1)"));
        let status: String = (0..5).map(|x| buf.get(x, MAP_ROW + 2).ch).collect();
        assert_eq!(status, "hello");
    }

    #[test]
    fn tiny_terminal_shows_warning_only() {
        let (_, session) = screen(&["Bkh"]);
        let mut buf = FrameBuffer::new(4, 2);
        compose(&mut buf, &session, &Hud { level_index: 0, level_count: 1, status: "" });
        assert_eq!(buf.get(0, 0).ch, 'T');
        assert_eq!(buf.get(0, 1), Cell::BLANK);
    }
}
