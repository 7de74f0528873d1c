//! Layout generation: mine placement, number calculation, and the
//! solver-driven retry loop that guarantees a no-guess board.
//!
//! A generation attempt places mines at random, opens the safe click and
//! hands the board to the solver with a [`MineContext`] oracle attached.
//! The oracle opens squares from the hidden layout and, when the solver
//! stalls, perturbs the layout through [`perturb_layout`]. A layout the
//! solver finishes without help is accepted as-is; one that needed help is
//! re-validated on its mutated form until it solves cleanly or stops
//! improving.

use crate::perturb::perturb_layout;
use crate::rng::EngineRng;
use crate::solver::{self, Change, Oracle, SolveResult};
use crate::types::{Grid, Mines, NeighborCache, VisibleGrid};

/// Generation attempts before giving up and returning an unvalidated
/// random layout.
pub const MAX_GENERATION_ATTEMPTS: u32 = 1000;

/// Attempts after which perturbation may target the whole unknown area
/// instead of a single constraint region.
pub const BIG_PERTURB_THRESHOLD: u32 = 100;

/// Place `n` mines uniformly at random, none inside the 3×3 safe window
/// around (sx, sy). Draws cells from the legal list by swap-and-pop, so
/// placement cannot stall at high densities.
pub fn place_mines_random(
    width: usize,
    height: usize,
    n: usize,
    sx: usize,
    sy: usize,
    rng: &mut EngineRng,
) -> Mines {
    let mut legal: Vec<(usize, usize)> = Vec::with_capacity(width * height);
    for x in 0..width {
        for y in 0..height {
            if x.abs_diff(sx) > 1 || y.abs_diff(sy) > 1 {
                legal.push((x, y));
            }
        }
    }
    let mut mines = Mines::new(width, height);
    for _ in 0..n.min(legal.len()) {
        let i = rng.gen_range(legal.len());
        let (x, y) = legal.swap_remove(i);
        mines.set(x, y, true);
    }
    mines
}

/// Calculate the neighbor mine counts for all non-mine cells.
///
/// Returns a Grid where each non-mine cell holds its adjacent mine count
/// (0-8). Mine cells keep 0; their value is never displayed.
pub fn calculate_numbers(mines: &Mines, neighbor_cache: &NeighborCache) -> Grid {
    let width = mines.width;
    let height = mines.height;
    let mut grid = Grid::new(width, height);

    for x in 0..width {
        for y in 0..height {
            if mines.get(x, y) {
                continue;
            }
            let mut count: i8 = 0;
            for &(nx, ny) in neighbor_cache.get(x, y) {
                if mines.get(nx, ny) {
                    count += 1;
                }
            }
            grid.set(x, y, count);
        }
    }

    grid
}

/// The hidden-layout oracle used during generation. Tracks which squares
/// the solver has opened and how long it has been asking for perturbations
/// without opening anything new.
pub struct MineContext<'a> {
    mines: &'a mut Mines,
    sx: usize,
    sy: usize,
    opened: Vec<bool>,
    perturbs_since_open: usize,
    allow_big_perturbs: bool,
}

impl<'a> MineContext<'a> {
    pub fn new(mines: &'a mut Mines, sx: usize, sy: usize, allow_big_perturbs: bool) -> Self {
        let opened = vec![false; mines.width * mines.height];
        Self {
            mines,
            sx,
            sy,
            opened,
            perturbs_since_open: 0,
            allow_big_perturbs,
        }
    }
}

impl Oracle for MineContext<'_> {
    fn open(&mut self, x: usize, y: usize) -> i8 {
        debug_assert!(!self.mines.get(x, y), "solver opened a mine");
        let idx = x * self.mines.height + y;
        if !self.opened[idx] {
            self.opened[idx] = true;
            self.perturbs_since_open = 0;
        }
        self.mines.neighbor_count(x, y)
    }

    fn perturb(
        &mut self,
        visible: &mut VisibleGrid,
        set_x: i32,
        set_y: i32,
        set_mask: u16,
        rng: &mut EngineRng,
    ) -> Option<Vec<Change>> {
        // A solver that keeps asking for help without uncovering anything
        // is not going to converge on this layout.
        self.perturbs_since_open += 1;
        if self.perturbs_since_open > self.mines.width.max(self.mines.height) {
            return None;
        }
        if set_mask == 0 && !self.allow_big_perturbs {
            return None;
        }
        perturb_layout(
            self.mines, visible, self.sx, self.sy, rng, set_x, set_y, set_mask,
        )
    }
}

/// A finished layout. `validated` is false only for `ensure_solvable =
/// false` boards and for the documented degradation after the retry
/// ceiling.
pub struct Layout {
    pub mines: Mines,
    pub numbers: Grid,
    pub attempts: u32,
    pub validated: bool,
}

/// Generate a mine layout for a first click at (sx, sy).
///
/// With `ensure_solvable` set, layouts are validated by the solver:
/// an attempt is accepted once a solver run over it needs no
/// perturbations. Runs that used perturbations mutated the layout, so it
/// is re-validated until clean; a stalled or non-improving rerun discards
/// it. After [`MAX_GENERATION_ATTEMPTS`] the engine degrades to a plain
/// random layout and logs a warning.
pub fn generate_layout(
    width: usize,
    height: usize,
    n: usize,
    sx: usize,
    sy: usize,
    rng: &mut EngineRng,
    ensure_solvable: bool,
    neighbor_cache: &NeighborCache,
) -> Layout {
    let mut attempts: u32 = 0;

    while attempts < MAX_GENERATION_ATTEMPTS {
        attempts += 1;

        let mut mines = place_mines_random(width, height, n, sx, sy, rng);
        let placed = mines.count();

        if !ensure_solvable {
            return Layout {
                numbers: calculate_numbers(&mines, neighbor_cache),
                mines,
                attempts,
                validated: false,
            };
        }

        let accepted = {
            let mut ctx =
                MineContext::new(&mut mines, sx, sy, attempts > BIG_PERTURB_THRESHOLD);
            let mut prev: Option<u32> = None;
            loop {
                let mut visible = VisibleGrid::new(width, height);
                let first = ctx.open(sx, sy);
                debug_assert_eq!(first, 0, "the safe window must open as a zero");
                visible.set(sx, sy, first);

                match solver::solve(&mut visible, placed, &mut ctx, rng) {
                    SolveResult::Solved(0) => break true,
                    SolveResult::Solved(p) => {
                        if prev.is_some_and(|q| p >= q) {
                            break false;
                        }
                        prev = Some(p);
                    }
                    SolveResult::Stalled => break false,
                }
            }
        };

        if accepted {
            log::debug!(
                "solvable {}x{} layout with {} mines after {} attempt(s)",
                width,
                height,
                placed,
                attempts
            );
            return Layout {
                numbers: calculate_numbers(&mines, neighbor_cache),
                mines,
                attempts,
                validated: true,
            };
        }
    }

    log::warn!(
        "no solvable {}x{} layout with {} mines within {} attempts; returning unvalidated layout",
        width,
        height,
        n,
        MAX_GENERATION_ATTEMPTS
    );
    let mines = place_mines_random(width, height, n, sx, sy, rng);
    Layout {
        numbers: calculate_numbers(&mines, neighbor_cache),
        mines,
        attempts: MAX_GENERATION_ATTEMPTS,
        validated: false,
    }
}
