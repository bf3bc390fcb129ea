/// Enemy AI: a small state machine producing one grid step per decision.
///
/// States:
///   1. **Patrolling**: roaming enemies walk a random axis within a leash
///      around their spawn; stationary enemies hold position.
///   2. **Chasing**: greedy step toward the nearest visible character.
///   3. **ReturningHome**: stationary enemies walk back to spawn once the
///      target is lost.
///
/// An enemy with a committed target is sliding: it makes no decision until
/// it lands. Decisions are further gated by a cooldown that restarts after
/// every decision.
///
/// Detection = Euclidean range AND Bresenham line of sight. Stealth
/// characters are never targeted.

use rand::Rng;

use super::entity::{AiState, Dir, Enemy, EnemyPreset, Entity, EntityKind, Role};
use super::grid::Grid;
use super::resolver::{self, Board};

/// Tunables shared by every enemy in a session.
#[derive(Clone, Copy, Debug)]
pub struct AiParams {
    pub detect_range: u32,
    pub patrol_distance: u32,
    pub move_cooldown: u32,
    pub frame_delay: u32,
}

/// Visible state transitions, for the event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AiNote {
    Spotted { enemy: usize, target: usize },
    LostTarget { enemy: usize },
}

/// One decision for one enemy.
#[derive(Clone, Copy, Debug)]
struct Decision {
    state: AiState,
    patrol_dir: Option<Dir>,
    step: Option<(i32, i32)>,
    target: Option<usize>,
}

struct Ctx<'a> {
    board: Board<'a>,
    entities: &'a [Entity],
    params: AiParams,
}

impl<'a> Ctx<'a> {
    fn tile(&self) -> i32 {
        self.board.tile
    }

    fn free(&self, me: usize, col: i32, row: i32) -> bool {
        resolver::enemy_can_enter(&self.board, self.entities, me, col, row)
    }
}

// ── Entry point ──

/// Run one AI tick for every active enemy, in insertion order. Each enemy's
/// committed step is visible to the enemies after it, so no two enemies
/// ever claim the same cell.
pub fn run<R: Rng>(
    grid: &Grid,
    tile: i32,
    entities: &mut [Entity],
    params: AiParams,
    rng: &mut R,
) -> Vec<AiNote> {
    let mut notes = vec![];

    for i in 0..entities.len() {
        if !entities[i].is_active() { continue; }
        let sliding = entities[i].body.moving_to_target;
        let EntityKind::Enemy(enemy) = &mut entities[i].kind else { continue };

        enemy.animate(sliding, params.frame_delay);
        if sliding { continue; }
        if enemy.move_timer > 0 {
            enemy.move_timer -= 1;
            continue;
        }

        let was = enemy.state;
        let ctx = Ctx { board: Board { grid, tile }, entities: &*entities, params };
        let d = decide(&ctx, i, rng);

        match (was == AiState::Chasing, d.state == AiState::Chasing, d.target) {
            (false, true, Some(target)) => notes.push(AiNote::Spotted { enemy: i, target }),
            (true, false, _) => notes.push(AiNote::LostTarget { enemy: i }),
            _ => {}
        }

        let e = &mut entities[i];
        if let EntityKind::Enemy(enemy) = &mut e.kind {
            enemy.state = d.state;
            enemy.patrol_dir = d.patrol_dir;
            enemy.move_timer = params.move_cooldown;
        }
        if let Some((dx, dy)) = d.step {
            let (col, row) = e.body.cell(tile);
            e.body.set_target_cell(col + dx, row + dy, tile);
            e.body.face_toward(dx);
            log::debug!("enemy {i} {:?} -> ({},{})", d.state, col + dx, row + dy);
        }
    }

    notes
}

// ── Decision ──

fn decide<R: Rng>(ctx: &Ctx, me: usize, rng: &mut R) -> Decision {
    let entity = &ctx.entities[me];
    let EntityKind::Enemy(enemy) = &entity.kind else {
        return Decision { state: AiState::Patrolling, patrol_dir: None, step: None, target: None };
    };
    let here = entity.body.cell(ctx.tile());

    let target = nearest_target(ctx.entities, entity);
    let spotted = target.filter(|&t| {
        let other = &ctx.entities[t];
        in_range(entity, other, ctx.params.detect_range, ctx.tile())
            && line_of_sight(ctx.board.grid, here, other.body.cell(ctx.tile()))
    });

    if let Some(t) = spotted {
        let step = chase_step(ctx, me, here, ctx.entities[t].body.cell(ctx.tile()));
        return Decision { state: AiState::Chasing, patrol_dir: enemy.patrol_dir, step, target: Some(t) };
    }

    match enemy.preset {
        EnemyPreset::Roaming => patrol(ctx, me, enemy, here, rng),
        EnemyPreset::Stationary if here != enemy.home => Decision {
            state: AiState::ReturningHome,
            patrol_dir: enemy.patrol_dir,
            step: home_step(ctx, me, here, enemy.home),
            target: None,
        },
        EnemyPreset::Stationary => Decision {
            state: AiState::Patrolling,
            patrol_dir: enemy.patrol_dir,
            step: None,
            target: None,
        },
    }
}

/// Nearest active non-stealth character by pixel distance.
fn nearest_target(entities: &[Entity], me: &Entity) -> Option<usize> {
    entities.iter().enumerate()
        .filter(|(_, e)| e.is_active() && matches!(e.role(), Some(r) if r != Role::Stealth))
        .min_by_key(|(_, e)| dist_sq(me, e))
        .map(|(i, _)| i)
}

fn dist_sq(a: &Entity, b: &Entity) -> i64 {
    let dx = (a.body.x - b.body.x) as i64;
    let dy = (a.body.y - b.body.y) as i64;
    dx * dx + dy * dy
}

fn in_range(a: &Entity, b: &Entity, range_tiles: u32, tile: i32) -> bool {
    let r = range_tiles as i64 * tile as i64;
    dist_sq(a, b) <= r * r
}

/// Bresenham walk from `from` to `to`. A cell blocks when it is
/// tile-collidable and is not the starting cell.
pub fn line_of_sight(grid: &Grid, from: (i32, i32), to: (i32, i32)) -> bool {
    let (mut x, mut y) = from;
    let (x1, y1) = to;
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if (x, y) != from && grid.is_collidable(x, y) { return false; }
        if (x, y) == to { return true; }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Step along the axis with the larger offset, column on a tie; fall back
/// to the other axis.
fn chase_step(ctx: &Ctx, me: usize, here: (i32, i32), goal: (i32, i32)) -> Option<(i32, i32)> {
    let dx = goal.0 - here.0;
    let dy = goal.1 - here.1;
    let horizontal = (dx.signum(), 0);
    let vertical = (0, dy.signum());
    let order = if dx.abs() >= dy.abs() { [horizontal, vertical] } else { [vertical, horizontal] };

    order.into_iter()
        .filter(|&s| s != (0, 0))
        .find(|&(sx, sy)| ctx.free(me, here.0 + sx, here.1 + sy))
}

/// Walk the patrol heading; on an invalid step turn around and wait.
fn patrol<R: Rng>(ctx: &Ctx, me: usize, enemy: &Enemy, here: (i32, i32), rng: &mut R) -> Decision {
    let dir = enemy.patrol_dir.unwrap_or_else(|| roll_dir(rng));
    let (dx, dy) = dir.delta();
    let next = (here.0 + dx, here.1 + dy);

    let leash = ctx.params.patrol_distance as i32;
    let away = if dir.is_horizontal() { next.0 - enemy.home.0 } else { next.1 - enemy.home.1 };

    if away.abs() > leash || !ctx.free(me, next.0, next.1) {
        return Decision { state: AiState::Patrolling, patrol_dir: Some(dir.reversed()), step: None, target: None };
    }
    Decision { state: AiState::Patrolling, patrol_dir: Some(dir), step: Some((dx, dy)), target: None }
}

/// Axis first, then sign.
fn roll_dir<R: Rng>(rng: &mut R) -> Dir {
    let horizontal = rng.random_bool(0.5);
    let positive = rng.random_bool(0.5);
    match (horizontal, positive) {
        (true, true) => Dir::Right,
        (true, false) => Dir::Left,
        (false, true) => Dir::Down,
        (false, false) => Dir::Up,
    }
}

/// One cell toward home on a single axis, column first.
fn home_step(ctx: &Ctx, me: usize, here: (i32, i32), home: (i32, i32)) -> Option<(i32, i32)> {
    let dc = (home.0 - here.0).signum();
    let dr = (home.1 - here.1).signum();
    let step = if dc != 0 { (dc, 0) } else { (0, dr) };
    ctx.free(me, here.0 + step.0, here.1 + step.1).then_some(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resolver::tests::{scene, TS};
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn params() -> AiParams {
        AiParams { detect_range: 2, patrol_distance: 3, move_cooldown: 2, frame_delay: 6 }
    }

    fn enemy(es: &[Entity], i: usize) -> &Enemy {
        match &es[i].kind {
            EntityKind::Enemy(e) => e,
            _ => panic!("not an enemy"),
        }
    }

    fn settle(es: &mut [Entity]) {
        for e in es.iter_mut() {
            while e.body.moving_to_target { e.body.interpolate(); }
        }
    }

    #[test]
    fn bresenham_blocked_by_wall_column() {
        let (grid, _) = scene(&["..#..", "..#..", "..#.."]);
        assert!(!line_of_sight(&grid, (1, 1), (3, 1)));
        assert!(!line_of_sight(&grid, (0, 0), (4, 2)));
        assert!(line_of_sight(&grid, (0, 0), (1, 2)));
    }

    #[test]
    fn own_cell_never_blocks_sight() {
        let (grid, _) = scene(&["#.."]);
        assert!(line_of_sight(&grid, (0, 0), (2, 0)));
    }

    #[test]
    fn wall_keeps_enemy_from_chasing() {
        let (grid, mut es) = scene(&["..#..", ".G#B.", "..#.."]);
        let mut rng = Pcg32::seed_from_u64(1);
        for _ in 0..30 {
            run(&grid, TS, &mut es, params(), &mut rng);
            assert!(!enemy(&es, 0).is_chasing());
            settle(&mut es);
        }
    }

    #[test]
    fn stealth_is_invisible() {
        let (grid, mut es) = scene(&["GS..."]);
        let mut rng = Pcg32::seed_from_u64(1);
        run(&grid, TS, &mut es, params(), &mut rng);
        assert!(!enemy(&es, 0).is_chasing());
        assert!(!es[0].body.moving_to_target);
    }

    #[test]
    fn chase_steps_onto_character_cell() {
        let (grid, mut es) = scene(&["GB..."]);
        let mut rng = Pcg32::seed_from_u64(1);
        let notes = run(&grid, TS, &mut es, params(), &mut rng);
        assert_eq!(notes, vec![AiNote::Spotted { enemy: 0, target: 1 }]);
        assert!(enemy(&es, 0).is_chasing());
        assert_eq!(es[0].body.target_cell(TS), (1, 0));
    }

    #[test]
    fn chase_falls_back_to_other_axis() {
        let (grid, mut es) = scene(&[
            "G#..",
            "..B.",
        ]);
        let mut rng = Pcg32::seed_from_u64(1);
        let wide = AiParams { detect_range: 3, ..params() };
        run(&grid, TS, &mut es, wide, &mut rng);
        assert!(enemy(&es, 0).is_chasing());
        assert_eq!(es[0].body.target_cell(TS), (0, 1));
    }

    #[test]
    fn diagonal_tie_steps_along_the_row_first() {
        let (grid, mut es) = scene(&["G..", ".B.", "..."]);
        let mut rng = Pcg32::seed_from_u64(1);
        run(&grid, TS, &mut es, AiParams { detect_range: 3, ..params() }, &mut rng);
        assert!(enemy(&es, 0).is_chasing());
        assert_eq!(es[0].body.target_cell(TS), (1, 0));
    }

    #[test]
    fn keys_and_chests_do_not_stop_a_chase() {
        for row in ["GkB", "GhB"] {
            let (grid, mut es) = scene(&[row, "###"]);
            let mut rng = Pcg32::seed_from_u64(1);
            run(&grid, TS, &mut es, AiParams { detect_range: 3, ..params() }, &mut rng);
            assert!(enemy(&es, 0).is_chasing(), "{row}");
            assert_eq!(es[0].body.target_cell(TS), (1, 0), "{row}");
        }
    }

    #[test]
    fn crates_still_stop_a_chase() {
        let (grid, mut es) = scene(&["GxB", "###"]);
        let mut rng = Pcg32::seed_from_u64(1);
        run(&grid, TS, &mut es, AiParams { detect_range: 3, ..params() }, &mut rng);
        assert!(enemy(&es, 0).is_chasing());
        assert!(!es[0].body.moving_to_target);
    }

    #[test]
    fn out_of_range_target_is_ignored() {
        let (grid, mut es) = scene(&["G....B"]);
        let mut rng = Pcg32::seed_from_u64(1);
        run(&grid, TS, &mut es, params(), &mut rng);
        assert!(!enemy(&es, 0).is_chasing());
    }

    #[test]
    fn cooldown_gates_decisions() {
        let (grid, mut es) = scene(&["G.B..."]);
        let mut rng = Pcg32::seed_from_u64(1);
        run(&grid, TS, &mut es, params(), &mut rng);
        settle(&mut es);
        assert_eq!(es[0].body.cell(TS), (1, 0));
        // Two idle ticks of cooldown before the next step.
        run(&grid, TS, &mut es, params(), &mut rng);
        run(&grid, TS, &mut es, params(), &mut rng);
        assert!(!es[0].body.moving_to_target);
        run(&grid, TS, &mut es, params(), &mut rng);
        assert_eq!(es[0].body.target_cell(TS), (2, 0));
    }

    #[test]
    fn patrol_stays_on_leash() {
        let (grid, mut es) = scene(&[
            "...............",
            "...............",
            "...............",
            "...............",
            ".......E.......",
            "...............",
            "...............",
            "...............",
            "...............",
        ]);
        let mut rng = Pcg32::seed_from_u64(42);
        let mut cells = vec![];
        for _ in 0..2000 {
            run(&grid, TS, &mut es, params(), &mut rng);
            es[0].body.interpolate();
            if !es[0].body.moving_to_target {
                cells.push(es[0].body.cell(TS));
            }
        }
        let home = (7, 4);
        assert!(cells.iter().all(|c| c.0 == home.0 || c.1 == home.1));
        assert!(cells.iter().all(|c| (c.0 - home.0).abs() <= 3 && (c.1 - home.1).abs() <= 3));
        assert!(cells.iter().any(|c| *c != home));
    }

    #[test]
    fn patrol_reverses_at_wall_without_moving() {
        let (grid, mut es) = scene(&["#E#"]);
        let mut rng = Pcg32::seed_from_u64(3);
        for _ in 0..10 {
            run(&grid, TS, &mut es, params(), &mut rng);
            assert!(!es[0].body.moving_to_target);
        }
        assert!(enemy(&es, 0).patrol_dir.is_some());
    }

    #[test]
    fn stationary_returns_home_column_first() {
        let (grid, mut es) = scene(&["G....", ".....", "....."]);
        es[0].body.place_at_cell(2, 2, TS);
        let mut rng = Pcg32::seed_from_u64(1);
        let mut path = vec![];
        for _ in 0..100 {
            run(&grid, TS, &mut es, params(), &mut rng);
            if es[0].body.moving_to_target {
                path.push(es[0].body.target_cell(TS));
            }
            settle(&mut es);
        }
        assert_eq!(path, vec![(1, 2), (0, 2), (0, 1), (0, 0)]);
        assert_eq!(enemy(&es, 0).state, AiState::Patrolling);
    }

    #[test]
    fn two_enemies_never_claim_one_cell() {
        let (grid, mut es) = scene(&["E.E", "#B#"]);
        let mut rng = Pcg32::seed_from_u64(9);
        run(&grid, TS, &mut es, params(), &mut rng);
        let a = es[0].body.target_cell(TS);
        let b = es[1].body.target_cell(TS);
        assert_ne!(a, b);
    }
}
