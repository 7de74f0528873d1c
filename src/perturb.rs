//! Layout perturbation: mine-preserving edits that unblock the solver.
//!
//! When deduction stalls, the generator does not throw the layout away.
//! It moves mines between the stalled constraint region and the rest of
//! the board so the region becomes fully mined or fully clear, which is
//! exactly the information the solver was missing. The safe window around
//! the first click never changes, and every already-opened square keeps a
//! truthful display: the visible grid is patched in step with the hidden
//! layout.

use crate::rng::EngineRng;
use crate::solver::Change;
use crate::types::{Mines, VisibleGrid, FLAGGED, UNKNOWN};

/// A square considered for a swap, ranked by how little information its
/// change would disturb.
struct Candidate {
    x: usize,
    y: usize,
    /// 1 = unknown bordering known space, 2 = unknown and isolated,
    /// 3 = already known (last resort).
    class: u8,
    sort_key: u32,
}

/// Edit the hidden layout around the target region
/// (set_x, set_y, set_mask), keeping the total mine count. A zero mask
/// targets the entire unknown area. Returns the applied changes, or
/// `None` when no useful swap exists.
pub fn perturb_layout(
    mines: &mut Mines,
    visible: &mut VisibleGrid,
    sx: usize,
    sy: usize,
    rng: &mut EngineRng,
    set_x: i32,
    set_y: i32,
    set_mask: u16,
) -> Option<Vec<Change>> {
    let w = mines.width;
    let h = mines.height;

    // Candidate squares, best class first, shuffled within each class.
    let mut candidates: Vec<Candidate> = Vec::new();
    for x in 0..w {
        for y in 0..h {
            if x.abs_diff(sx) <= 1 && y.abs_diff(sy) <= 1 {
                continue; // safe window
            }
            if set_mask != 0 {
                let dx = x as i32 - set_x;
                let dy = y as i32 - set_y;
                if (0..3).contains(&dx)
                    && (0..3).contains(&dy)
                    && set_mask & (1 << (dy * 3 + dx)) != 0
                {
                    continue; // inside the target region
                }
            }
            let class = if visible.get(x, y) != UNKNOWN {
                3
            } else if borders_known(visible, x, y) {
                1
            } else {
                2
            };
            candidates.push(Candidate {
                x,
                y,
                class,
                sort_key: rng.bits(),
            });
        }
    }
    candidates.sort_by_key(|c| (c.class, c.sort_key, c.x, c.y));

    // Survey the target region: how many of its cells are mined, how many
    // are clear.
    let mut region: Vec<(usize, usize)> = Vec::new();
    if set_mask != 0 {
        for dy in 0..3 {
            for dx in 0..3 {
                if set_mask & (1 << (dy * 3 + dx)) != 0 {
                    region.push(((set_x + dx) as usize, (set_y + dy) as usize));
                }
            }
        }
    } else {
        for x in 0..w {
            for y in 0..h {
                if visible.get(x, y) == UNKNOWN {
                    region.push((x, y));
                }
            }
        }
    }
    let n_full = region.iter().filter(|&&(x, y)| mines.get(x, y)).count();
    let n_empty = region.len() - n_full;

    // Walk the candidate list until we have found either enough clear
    // squares to absorb the region's mines, or enough mined squares to
    // fill its holes.
    let mut to_fill: Vec<(usize, usize)> = Vec::new();
    let mut to_empty: Vec<(usize, usize)> = Vec::new();
    for c in &candidates {
        if to_fill.len() == n_full || to_empty.len() == n_empty {
            break;
        }
        if mines.get(c.x, c.y) {
            to_empty.push((c.x, c.y));
        } else {
            to_fill.push((c.x, c.y));
        }
    }

    let mut changes: Vec<Change> = Vec::new();
    if to_fill.len() == n_full && n_full > 0 {
        // Clear the region: each of its mines moves out to a clear
        // candidate.
        for &(x, y) in &to_fill {
            changes.push(Change { x, y, delta: 1 });
        }
        for &(x, y) in &region {
            if mines.get(x, y) {
                changes.push(Change { x, y, delta: -1 });
            }
        }
    } else if to_empty.len() == n_empty && n_empty > 0 {
        // Fill the region: each of its holes takes a mine from a mined
        // candidate.
        for &(x, y) in &to_empty {
            changes.push(Change { x, y, delta: -1 });
        }
        for &(x, y) in &region {
            if !mines.get(x, y) {
                changes.push(Change { x, y, delta: 1 });
            }
        }
    } else {
        // Neither full swap fits (dense boards). Fill as much of the
        // region as the mined candidates allow: a partial swap still
        // gives the solver fresh numbers to work with.
        let mut holes: Vec<(usize, usize)> =
            region.iter().copied().filter(|&(x, y)| !mines.get(x, y)).collect();
        let k = to_empty.len().min(holes.len());
        if k == 0 {
            return None;
        }
        for i in 0..k {
            let j = i + rng.gen_range(holes.len() - i);
            holes.swap(i, j);
        }
        for &(x, y) in to_empty.iter().take(k) {
            changes.push(Change { x, y, delta: -1 });
        }
        for &(x, y) in holes.iter().take(k) {
            changes.push(Change { x, y, delta: 1 });
        }
    }

    if changes.is_empty() {
        return None;
    }

    // Apply the whole batch to the hidden layout before touching the
    // visible grid: a rederived number must see the final layout, not a
    // half-applied one.
    for c in &changes {
        debug_assert!((c.delta < 0) == mines.get(c.x, c.y));
        mines.set(c.x, c.y, c.delta > 0);
    }

    // Patch the visible grid. Changed squares that were themselves known
    // are only collected here; their numbers are rederived after every
    // incremental neighbor patch has run, so the rederivation overwrites
    // any patch another change in the batch applied to them.
    let mut recompute: Vec<(usize, usize)> = Vec::new();
    for c in &changes {
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                let nx = c.x as i32 + dx;
                let ny = c.y as i32 + dy;
                if nx < 0 || nx >= w as i32 || ny < 0 || ny >= h as i32 {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                let v = visible.get(nx, ny);
                if v == UNKNOWN {
                    continue;
                }
                if dx == 0 && dy == 0 {
                    // The changed square itself was known: it is now a
                    // mine, or it needs its number rederived.
                    if c.delta > 0 {
                        visible.set(nx, ny, FLAGGED);
                    } else {
                        recompute.push((nx, ny));
                    }
                } else if v >= 0 {
                    visible.set(nx, ny, v + c.delta as i8);
                }
            }
        }
    }
    for &(x, y) in &recompute {
        visible.set(x, y, mines.neighbor_count(x, y));
    }

    Some(changes)
}

fn borders_known(visible: &VisibleGrid, x: usize, y: usize) -> bool {
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            if nx >= 0
                && nx < visible.width as i32
                && ny >= 0
                && ny < visible.height as i32
                && visible.get(nx as usize, ny as usize) != UNKNOWN
            {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::is_number;

    /// Board with the safe window opened at (0, 0), one opened number
    /// frontier, and a stalled 50-50 pair region.
    fn fixture() -> (Mines, VisibleGrid) {
        // 6x4, mines at (3,0) and (5,3); open columns 0..=1 plus (2,*).
        let mut mines = Mines::new(6, 4);
        mines.set(3, 0, true);
        mines.set(5, 3, true);
        let mut visible = VisibleGrid::new(6, 4);
        for x in 0..3 {
            for y in 0..4 {
                visible.set(x, y, mines.neighbor_count(x, y));
            }
        }
        (mines, visible)
    }

    fn check_visible_truthful(mines: &Mines, visible: &VisibleGrid) {
        for x in 0..mines.width {
            for y in 0..mines.height {
                let v = visible.get(x, y);
                if is_number(v) {
                    assert_eq!(
                        v,
                        mines.neighbor_count(x, y),
                        "opened ({}, {}) shows a stale count",
                        x,
                        y
                    );
                    assert!(!mines.get(x, y), "opened ({}, {}) covers a mine", x, y);
                }
                if v == FLAGGED {
                    assert!(mines.get(x, y), "flag at ({}, {}) without a mine", x, y);
                }
            }
        }
    }

    #[test]
    fn test_perturb_preserves_mine_count() {
        let (mut mines, mut visible) = fixture();
        let before = mines.count();
        let mut rng = EngineRng::from_seed(9);
        // Target the pair region {(3,0),(3,1)} - window (3,0), bits 0 and 3.
        let changes = perturb_layout(&mut mines, &mut visible, 0, 0, &mut rng, 3, 0, 0o011)
            .expect("swap must exist");
        assert!(!changes.is_empty());
        assert_eq!(mines.count(), before);
        // The change list balances.
        let sum: i32 = changes.iter().map(|c| c.delta).sum();
        assert_eq!(sum, 0);
    }

    #[test]
    fn test_perturb_respects_safe_window() {
        let (mut mines, mut visible) = fixture();
        let mut rng = EngineRng::from_seed(11);
        let changes = perturb_layout(&mut mines, &mut visible, 0, 0, &mut rng, 3, 0, 0o011)
            .expect("swap must exist");
        for c in &changes {
            assert!(
                c.x > 1 || c.y > 1,
                "changed ({}, {}) inside the safe window",
                c.x,
                c.y
            );
        }
        for x in 0..2 {
            for y in 0..2 {
                assert!(!mines.get(x, y));
            }
        }
    }

    #[test]
    fn test_perturb_keeps_opened_numbers_truthful() {
        let (mut mines, mut visible) = fixture();
        for seed in 0..20 {
            let mut m = mines.clone();
            let mut v = visible.clone();
            let mut rng = EngineRng::from_seed(seed);
            if perturb_layout(&mut m, &mut v, 0, 0, &mut rng, 3, 0, 0o011).is_some() {
                check_visible_truthful(&m, &v);
            }
        }
        // And once in place for the borrow-happy path.
        let mut rng = EngineRng::from_seed(3);
        if perturb_layout(&mut mines, &mut visible, 0, 0, &mut rng, 3, 0, 0o011).is_some() {
            check_visible_truthful(&mines, &visible);
        }
    }

    #[test]
    fn test_perturb_settles_target_region() {
        // After a successful full swap the target region is uniform:
        // all mines or all clear.
        let (mut mines, mut visible) = fixture();
        let mut rng = EngineRng::from_seed(5);
        perturb_layout(&mut mines, &mut visible, 0, 0, &mut rng, 3, 0, 0o011)
            .expect("swap must exist");
        let a = mines.get(3, 0);
        let b = mines.get(3, 1);
        assert_eq!(a, b, "region should be flooded or drained");
    }

    #[test]
    fn test_perturb_changed_known_square_redisplays() {
        // Force the last-resort path: every square outside the target
        // region is already opened, so the swap must touch a known square,
        // which then has to redisplay as a flag.
        let mut mines = Mines::new(4, 4);
        mines.set(2, 2, true);
        let mut visible = VisibleGrid::new(4, 4);
        for x in 0..4 {
            for y in 0..4 {
                if (x, y) != (2, 2) && (x, y) != (2, 3) {
                    visible.set(x, y, mines.neighbor_count(x, y));
                }
            }
        }
        let before = mines.count();
        let mut rng = EngineRng::from_seed(1);
        // Target window (2,2), bits 0 and 3 = cells (2,2),(2,3).
        let changes = perturb_layout(&mut mines, &mut visible, 0, 0, &mut rng, 2, 2, 0o011)
            .expect("an opened square must be usable as last resort");
        assert_eq!(mines.count(), before);
        check_visible_truthful(&mines, &visible);
        // The mine left the region and landed on a previously-open square,
        // which now shows as a flag.
        assert!(!mines.get(2, 2));
        let &Change { x, y, .. } = changes
            .iter()
            .find(|c| c.delta > 0)
            .expect("a mine was added somewhere");
        assert_eq!(visible.get(x, y), FLAGGED);
    }

    #[test]
    fn test_demined_flag_rederives_against_whole_batch() {
        // A flag placed before the first reveal can sit on a real mine and
        // become a last-resort candidate. When the swap that demines it
        // also fills an adjacent region hole, its rederived number must
        // include the mine added later in the same batch.
        //
        //   x = 0 1 2
        //       0 0 .     y=0  safe window numbers
        //       2 3 .     y=1  ((1,1) touches three mines)
        //       m m F     y=2  F = flagged candidate, mined
        //       m ? m     y=3  region row: hole at (1,3)
        let mut mines = Mines::new(3, 4);
        for &(x, y) in &[(0, 2), (1, 2), (0, 3), (2, 3), (2, 2)] {
            mines.set(x, y, true);
        }
        let mut visible = VisibleGrid::new(3, 4);
        for x in 0..2 {
            for y in 0..2 {
                visible.set(x, y, mines.neighbor_count(x, y));
            }
        }
        visible.set(2, 2, FLAGGED);

        let mut rng = EngineRng::from_seed(0);
        // Target window (0,2), bits 0,1,3,4,5 = the region row pair. Its
        // four mines dwarf the two clear candidates, so the only possible
        // outcome is the fill branch: demine (2,2), mine the hole (1,3).
        let changes = perturb_layout(&mut mines, &mut visible, 0, 0, &mut rng, 0, 2, 0o073)
            .expect("fill swap must exist");
        assert_eq!(
            changes,
            vec![
                Change { x: 2, y: 2, delta: -1 },
                Change { x: 1, y: 3, delta: 1 },
            ]
        );
        assert_eq!(mines.count(), 5);
        // The demined flag now shows a number counting the mine that was
        // added after it in the change list.
        assert_eq!(visible.get(2, 2), 3);
        assert_eq!(visible.get(1, 1), 2);
        check_visible_truthful(&mines, &visible);
    }
}
