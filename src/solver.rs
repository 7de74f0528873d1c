//! Deductive solver: proves squares safe or mined without guessing.
//!
//! The solver reads a [`VisibleGrid`] and drives two FIFO work-lists. The
//! per-square list turns newly known squares into constraint sets and
//! shrinks every set that contained them; the per-set list applies the
//! saturation and pairwise wing rules. When both run dry, a global pass
//! uses the total mine count, escalating to an enumeration of disjoint
//! unions of sets. If even that cannot move, the solver asks its
//! [`Oracle`] to perturb the hidden layout and resumes on the edited
//! board.
//!
//! Squares are only ever opened through the oracle, so the same routine
//! both validates finished layouts (a [`ReadOnlyOracle`], which never
//! perturbs) and steers generation (a perturbing oracle).

use std::collections::VecDeque;

use crate::mask;
use crate::rng::EngineRng;
use crate::setstore::{ConstraintSet, SetStore};
use crate::types::{Mines, VisibleGrid, FLAGGED, UNKNOWN};

/// Upper bound on the store size for the disjoint-union enumeration; a
/// larger store skips that step to bound runtime.
pub const MAX_UNION_SETS: usize = 10;

/// Outcome of one solver session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveResult {
    /// Every unknown square was resolved; the payload counts the
    /// perturbations that were needed (0 = the layout stood on its own).
    Solved(u32),
    /// Deduction ran out of moves with unknown squares remaining.
    Stalled,
}

/// One edit to the hidden layout: +1 added a mine at (x, y), -1 removed
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub x: usize,
    pub y: usize,
    pub delta: i32,
}

/// The hidden-layout context the solver works against.
pub trait Oracle {
    /// Open a square and return its neighbor mine count. The solver only
    /// opens squares it has proven safe.
    fn open(&mut self, x: usize, y: usize) -> i8;

    /// Edit the hidden layout so the constraint region at
    /// (set_x, set_y, set_mask) gains information, patching `visible`
    /// accordingly. A mask of 0 asks for a perturbation of the whole
    /// unknown area. Returns the applied changes, or `None` when no edit
    /// is available.
    fn perturb(
        &mut self,
        visible: &mut VisibleGrid,
        set_x: i32,
        set_y: i32,
        set_mask: u16,
        rng: &mut EngineRng,
    ) -> Option<Vec<Change>> {
        let _ = (visible, set_x, set_y, set_mask, rng);
        None
    }
}

/// Oracle over a fixed layout; opens squares but never perturbs. Used to
/// validate finished layouts and in deduction tests.
pub struct ReadOnlyOracle<'a> {
    mines: &'a Mines,
}

impl<'a> ReadOnlyOracle<'a> {
    pub fn new(mines: &'a Mines) -> Self {
        Self { mines }
    }
}

impl Oracle for ReadOnlyOracle<'_> {
    fn open(&mut self, x: usize, y: usize) -> i8 {
        debug_assert!(!self.mines.get(x, y), "solver opened a mine");
        self.mines.neighbor_count(x, y)
    }
}

/// Run one solver session over `visible`. `n_mines` is the total mine
/// count of the board. At least one square must already be open.
pub fn solve(
    visible: &mut VisibleGrid,
    n_mines: usize,
    oracle: &mut dyn Oracle,
    rng: &mut EngineRng,
) -> SolveResult {
    let w = visible.width;
    let h = visible.height;
    let mut store = SetStore::new();
    let mut squares: VecDeque<usize> = VecDeque::new();
    let mut nperturbs = 0u32;

    // Everything already known seeds the per-square list.
    for x in 0..w {
        for y in 0..h {
            if visible.get(x, y) != UNKNOWN {
                squares.push_back(x * h + y);
            }
        }
    }

    loop {
        // Per-square list first: it feeds the set list.
        if let Some(idx) = squares.pop_front() {
            let x = idx / h;
            let y = idx % h;
            let v = visible.get(x, y);

            if v >= 0 {
                // A numeric square contributes a constraint over its
                // unknown neighbors, less any neighbors already flagged.
                let mut mines = v as i32;
                let mut bits: u16 = 0;
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        if nx < 0 || nx >= w as i32 || ny < 0 || ny >= h as i32 {
                            continue;
                        }
                        match visible.get(nx as usize, ny as usize) {
                            FLAGGED => mines -= 1,
                            UNKNOWN => bits |= 1 << ((dy + 1) * 3 + (dx + 1)),
                            _ => {}
                        }
                    }
                }
                if bits != 0 {
                    store.add(x as i32 - 1, y as i32 - 1, bits, mines);
                }
            }

            // Every set containing this square shrinks by it.
            let was_flagged = v == FLAGGED;
            for s in store.overlapping_with(x as i32, y as i32, 1) {
                let new_mask = mask::difference(s.x, s.y, s.mask, x as i32, y as i32, 1);
                let new_mines = s.mines - was_flagged as i32;
                if new_mask != 0 {
                    store.add(s.x, s.y, new_mask, new_mines);
                }
                store.remove(s.x, s.y, s.mask);
            }
            continue;
        }

        if let Some(s) = store.pop_todo() {
            // Saturation: a count of zero or of the set's own size settles
            // every cell in it.
            let size = mask::popcount(s.mask) as i32;
            if s.mines == 0 || s.mines == size {
                mark_known(visible, oracle, &mut squares, s.x, s.y, s.mask, s.mines != 0);
                continue;
            }

            // Pairwise wing rule against every overlapping set.
            for s2 in store.overlapping_with(s.x, s.y, s.mask) {
                if s2 == s {
                    continue;
                }
                let wing = mask::difference(s.x, s.y, s.mask, s2.x, s2.y, s2.mask);
                let wing2 = mask::difference(s2.x, s2.y, s2.mask, s.x, s.y, s.mask);
                let wc = mask::popcount(wing) as i32;
                let wc2 = mask::popcount(wing2) as i32;

                if wc == s.mines - s2.mines || wc2 == s2.mines - s.mines {
                    // One wing soaks up the whole count difference: it is
                    // all mines, and the other wing is all safe.
                    mark_known(
                        visible,
                        oracle,
                        &mut squares,
                        s.x,
                        s.y,
                        wing,
                        wc == s.mines - s2.mines,
                    );
                    mark_known(
                        visible,
                        oracle,
                        &mut squares,
                        s2.x,
                        s2.y,
                        wing2,
                        wc2 == s2.mines - s.mines,
                    );
                    continue;
                }

                if wc == 0 && wc2 != 0 {
                    // s is a subset of s2; the difference is a new set.
                    store.add(s2.x, s2.y, wing2, s2.mines - s.mines);
                } else if wc2 == 0 && wc != 0 {
                    store.add(s.x, s.y, wing, s.mines - s2.mines);
                }
            }
            continue;
        }

        // Both lists are dry: fall back on the global mine count.
        let mut mines_left = n_mines as i32;
        let mut squares_left = 0i32;
        for x in 0..w {
            for y in 0..h {
                match visible.get(x, y) {
                    FLAGGED => mines_left -= 1,
                    UNKNOWN => squares_left += 1,
                    _ => {}
                }
            }
        }

        if squares_left == 0 {
            break;
        }

        if mines_left == 0 || mines_left == squares_left {
            // Every remaining square is determined.
            for x in 0..w {
                for y in 0..h {
                    if visible.get(x, y) == UNKNOWN {
                        mark_known(
                            visible,
                            oracle,
                            &mut squares,
                            x as i32,
                            y as i32,
                            1,
                            mines_left != 0,
                        );
                    }
                }
            }
            continue;
        }

        if union_closure(visible, oracle, &store, &mut squares, mines_left, squares_left) {
            continue;
        }

        // Out of deductions. Ask the oracle to edit the layout around a
        // randomly chosen set (mask 0 when the store is empty).
        nperturbs += 1;
        let changes = match store.pick_random(rng) {
            Some(t) => oracle.perturb(visible, t.x, t.y, t.mask, rng),
            None => oracle.perturb(visible, 0, 0, 0, rng),
        };
        let Some(changes) = changes else {
            break;
        };
        debug_assert!(!changes.is_empty());

        // A removed mine under a known square means that square now shows
        // a fresh number; re-derive its constraint.
        for c in &changes {
            if c.delta < 0 && visible.get(c.x, c.y) != UNKNOWN {
                squares.push_back(c.x * h + c.y);
            }
        }
        // Every set containing a changed square saw its true count move.
        for c in &changes {
            for s in store.overlapping_with(c.x as i32, c.y as i32, 1) {
                store.bump_mines(s.x, s.y, s.mask, c.delta);
                store.push_todo(s.x, s.y, s.mask);
            }
        }
    }

    for x in 0..w {
        for y in 0..h {
            if visible.get(x, y) == UNKNOWN {
                return SolveResult::Stalled;
            }
        }
    }
    SolveResult::Solved(nperturbs)
}

/// Settle every cell selected by `bits` in the window at (x, y): flag it
/// when `mine`, otherwise open it through the oracle. Newly settled
/// squares join the per-square work-list.
fn mark_known(
    visible: &mut VisibleGrid,
    oracle: &mut dyn Oracle,
    squares: &mut VecDeque<usize>,
    x: i32,
    y: i32,
    bits: u16,
    mine: bool,
) {
    let h = visible.height;
    for dy in 0..3 {
        for dx in 0..3 {
            if bits & (1 << (dy * 3 + dx)) == 0 {
                continue;
            }
            let cx = (x + dx) as usize;
            let cy = (y + dy) as usize;
            debug_assert!(visible.in_bounds(cx, cy));
            if visible.get(cx, cy) != UNKNOWN {
                continue;
            }
            if mine {
                visible.set(cx, cy, FLAGGED);
            } else {
                let v = oracle.open(cx, cy);
                debug_assert!((0..=8).contains(&v));
                visible.set(cx, cy, v);
            }
            squares.push_back(cx * h + cy);
        }
    }
}

/// The disjoint-union deduction: enumerate subsets of pairwise-disjoint
/// sets; if the squares outside some union carry a forced mine count
/// (none, or all of them), settle them all. Returns whether anything was
/// deduced.
fn union_closure(
    visible: &mut VisibleGrid,
    oracle: &mut dyn Oracle,
    store: &SetStore,
    squares: &mut VecDeque<usize>,
    mines_left: i32,
    squares_left: i32,
) -> bool {
    if store.len() > MAX_UNION_SETS {
        return false;
    }
    let sets: Vec<ConstraintSet> = store.iter().collect();
    let mut used = vec![false; sets.len()];
    if !union_search(&sets, &mut used, 0, mines_left, squares_left) {
        return false;
    }

    let mut rest_mines = mines_left;
    for (s, &u) in sets.iter().zip(&used) {
        if u {
            rest_mines -= s.mines;
        }
    }

    let w = visible.width;
    let h = visible.height;
    for x in 0..w {
        for y in 0..h {
            if visible.get(x, y) != UNKNOWN {
                continue;
            }
            let in_union = sets.iter().zip(&used).any(|(s, &u)| {
                u && mask::intersect(s.x, s.y, s.mask, x as i32, y as i32, 1) != 0
            });
            if !in_union {
                mark_known(
                    visible,
                    oracle,
                    squares,
                    x as i32,
                    y as i32,
                    1,
                    rest_mines != 0,
                );
            }
        }
    }
    true
}

/// Recursive backtracking over `sets` from index `i`, tracking the mine
/// and square count outside the union built so far. Succeeds when some
/// union leaves a determined outside.
fn union_search(
    sets: &[ConstraintSet],
    used: &mut [bool],
    i: usize,
    mines_left: i32,
    squares_left: i32,
) -> bool {
    if i == sets.len() {
        return squares_left > 0 && (mines_left == 0 || mines_left == squares_left);
    }
    let s = sets[i];
    let disjoint = (0..i).all(|j| {
        !used[j] || mask::intersect(s.x, s.y, s.mask, sets[j].x, sets[j].y, sets[j].mask) == 0
    });
    if disjoint {
        used[i] = true;
        if union_search(
            sets,
            used,
            i + 1,
            mines_left - s.mines,
            squares_left - mask::popcount(s.mask) as i32,
        ) {
            return true;
        }
        used[i] = false;
    }
    union_search(sets, used, i + 1, mines_left, squares_left)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Open one square on a fresh grid and solve with a fixed layout.
    fn check(mines: &Mines, n: usize, sx: usize, sy: usize) -> (SolveResult, VisibleGrid) {
        let mut visible = VisibleGrid::new(mines.width, mines.height);
        let mut oracle = ReadOnlyOracle::new(mines);
        visible.set(sx, sy, oracle.open(sx, sy));
        let mut rng = EngineRng::from_seed(0);
        let result = solve(&mut visible, n, &mut oracle, &mut rng);
        (result, visible)
    }

    #[test]
    fn test_solve_no_mines_opens_everything() {
        let mines = Mines::new(5, 5);
        let (result, visible) = check(&mines, 0, 2, 2);
        assert_eq!(result, SolveResult::Solved(0));
        for x in 0..5 {
            for y in 0..5 {
                assert_eq!(visible.get(x, y), 0);
            }
        }
    }

    #[test]
    fn test_solve_corner_mine() {
        // One mine at (0, 0), opening from the far corner. The zero flood
        // plus the global count settle the whole board.
        let mut mines = Mines::new(4, 4);
        mines.set(0, 0, true);
        let (result, visible) = check(&mines, 1, 3, 3);
        assert_eq!(result, SolveResult::Solved(0));
        assert_eq!(visible.get(0, 0), FLAGGED);
        assert_eq!(visible.get(1, 1), 1);
        assert_eq!(visible.get(2, 2), 0);
    }

    #[test]
    fn test_solve_flags_match_layout() {
        let mut mines = Mines::new(6, 6);
        mines.set(0, 3, true);
        mines.set(5, 0, true);
        mines.set(5, 5, true);
        let (result, visible) = check(&mines, 3, 2, 1);
        if let SolveResult::Solved(p) = result {
            assert_eq!(p, 0);
            for x in 0..6 {
                for y in 0..6 {
                    if mines.get(x, y) {
                        assert_eq!(visible.get(x, y), FLAGGED);
                    } else {
                        assert_eq!(visible.get(x, y), mines.neighbor_count(x, y));
                    }
                }
            }
        } else {
            panic!("layout should be deducible");
        }
    }

    #[test]
    fn test_solve_stalls_on_fifty_fifty() {
        // 2x3 column pair: the mine is in one of two symmetric squares, so
        // no deduction can pick it.
        //
        //   . . m      columns x = 0..2, mine at (2, 0)
        //   . . .
        let mut mines = Mines::new(3, 2);
        mines.set(2, 0, true);
        let (result, visible) = check(&mines, 1, 0, 0);
        assert_eq!(result, SolveResult::Stalled);
        // The left columns opened; the mine pair stayed unknown.
        assert_eq!(visible.get(0, 0), 0);
        assert_eq!(visible.get(2, 0), UNKNOWN);
        assert_eq!(visible.get(2, 1), UNKNOWN);
    }

    #[test]
    fn test_wing_rule_one_two_pattern() {
        // Classic 1-2 pattern on the bottom edge of a 5x3 board:
        //
        //   x = 0 1 2 3 4
        //       . . . . .    row y=0 unknown
        //       1 2 2 1 .    row y=1 numbers (given open)
        //       0 0 0 0 0    row y=2 open zeros
        //
        // Mines at (1,0) and (2,0). The wing deductions must place both
        // flags and clear (0,0), (3,0), (4,0) without the global count
        // (n passed high enough not to trigger the endgame shortcut).
        let mut mines = Mines::new(5, 3);
        mines.set(1, 0, true);
        mines.set(2, 0, true);
        let mut visible = VisibleGrid::new(5, 3);
        let mut oracle = ReadOnlyOracle::new(&mines);
        for x in 0..5 {
            for y in 1..3 {
                visible.set(x, y, oracle.open(x, y));
            }
        }
        let mut rng = EngineRng::from_seed(0);
        let result = solve(&mut visible, 2, &mut oracle, &mut rng);
        assert_eq!(result, SolveResult::Solved(0));
        assert_eq!(visible.get(1, 0), FLAGGED);
        assert_eq!(visible.get(2, 0), FLAGGED);
        assert_eq!(visible.get(0, 0), 1);
        assert_eq!(visible.get(3, 0), 1);
        assert_eq!(visible.get(4, 0), 0);
    }

    #[test]
    fn test_union_closure_fires() {
        // 8x2 board, mines at (0,0) and (5,0), columns 1..=4 opened:
        //
        //   x =  0 1 2 3 4 5 6 7
        //   y=0: m 1 0 0 1 m ? ?
        //   y=1: ? 1 0 0 1 ? ? ?
        //
        // Column 1 constrains the pair {(0,0),(0,1)} to one mine, column 4
        // the pair {(5,0),(5,1)}. The pairs themselves stay ambiguous, but
        // their disjoint union accounts for both mines, so the closure
        // must prove columns 6 and 7 safe and open them.
        let mut mines = Mines::new(8, 2);
        mines.set(0, 0, true);
        mines.set(5, 0, true);
        let mut visible = VisibleGrid::new(8, 2);
        let mut oracle = ReadOnlyOracle::new(&mines);
        for x in 1..=4 {
            for y in 0..2 {
                visible.set(x, y, oracle.open(x, y));
            }
        }
        let mut rng = EngineRng::from_seed(0);
        let result = solve(&mut visible, 2, &mut oracle, &mut rng);
        assert_eq!(result, SolveResult::Stalled);
        assert_eq!(visible.get(6, 0), 1);
        assert_eq!(visible.get(6, 1), 1);
        assert_eq!(visible.get(7, 0), 0);
        assert_eq!(visible.get(7, 1), 0);
        // The ambiguous pairs are untouched.
        assert_eq!(visible.get(0, 0), UNKNOWN);
        assert_eq!(visible.get(5, 1), UNKNOWN);
    }

    #[test]
    fn test_union_search_respects_disjointness() {
        let mut store = SetStore::new();
        // Two overlapping sets; a union may only use one of them.
        store.add(0, 0, 0o003, 1);
        store.add(1, 0, 0o003, 1);
        let sets: Vec<ConstraintSet> = store.iter().collect();
        let mut used = vec![false; sets.len()];
        // 3 unknown squares, 2 mines: one set used leaves 1 square with 1
        // mine outside - determined. Both sets used would be illegal.
        assert!(union_search(&sets, &mut used, 0, 2, 3));
        assert_eq!(used, vec![true, false]);
    }
}
