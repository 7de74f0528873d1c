//! Guaranteed-solvable Minesweeper board engine.
//!
//! Given a geometry, a mine count and the player's first click, the
//! engine produces a layout that a perfect logical solver can uncover
//! completely without guessing. Layouts that stall the solver are not
//! thrown away: the [`perturb`] module swaps mines between regions until
//! deduction can continue, preserving the safe window around the first
//! click and everything the player has already seen.
//!
//! The deductive core lives in [`solver`] (3×3 bit-mask constraint sets
//! with overlap, subset and disjoint-union reasoning) and is driven by
//! the generation loop in [`board`]. The playable surface (reveal,
//! flag, chord, win/loss bookkeeping, events) is [`game::Game`].
//!
//! When compiled for wasm32 the engine is also callable from JavaScript;
//! grid data crosses the boundary as flat typed arrays in column-major
//! layout (`cells[x * height + y]`).

pub mod board;
pub mod game;
pub mod mask;
pub mod perturb;
pub mod rng;
pub mod setstore;
pub mod solver;
pub mod types;

// ─── WASM exports (only compiled for the wasm32 target) ─────────────────────

#[cfg(target_arch = "wasm32")]
mod wasm_exports {
    use wasm_bindgen::prelude::*;

    use crate::board;
    use crate::rng::EngineRng;
    use crate::solver::{self, Oracle, ReadOnlyOracle, SolveResult};
    use crate::types::{Mines, NeighborCache, VisibleGrid};

    /// Check that a layout is fully deducible from the given start square
    /// without guessing.
    #[wasm_bindgen(js_name = "isSolvable")]
    pub fn wasm_is_solvable(
        width: usize,
        height: usize,
        mines_flat: &[u8],
        start_x: usize,
        start_y: usize,
    ) -> bool {
        let mines = Mines {
            width,
            height,
            cells: mines_flat.to_vec(),
        };
        if mines.get(start_x, start_y) {
            return false;
        }
        let n = mines.count();
        let mut visible = VisibleGrid::new(width, height);
        let mut oracle = ReadOnlyOracle::new(&mines);
        visible.set(start_x, start_y, oracle.open(start_x, start_y));
        let mut rng = EngineRng::new();
        solver::solve(&mut visible, n, &mut oracle, &mut rng) == SolveResult::Solved(0)
    }

    /// Generate a no-guess layout for a first click at (safe_x, safe_y).
    /// Returns `{ validated: bool, attempts: u32, mines: Uint8Array,
    /// numbers: Int8Array }`.
    #[wasm_bindgen(js_name = "generateSolvableBoard")]
    pub fn wasm_generate_solvable_board(
        width: usize,
        height: usize,
        mine_count: usize,
        safe_x: usize,
        safe_y: usize,
        seed: Option<u64>,
    ) -> JsValue {
        let nc = NeighborCache::new(width, height);
        let mut rng = seed.map(EngineRng::from_seed).unwrap_or_default();
        let layout =
            board::generate_layout(width, height, mine_count, safe_x, safe_y, &mut rng, true, &nc);

        let obj = js_sys::Object::new();
        js_sys::Reflect::set(&obj, &"validated".into(), &layout.validated.into()).unwrap();
        js_sys::Reflect::set(&obj, &"attempts".into(), &layout.attempts.into()).unwrap();

        let mines_arr = js_sys::Uint8Array::new_with_length(layout.mines.cells.len() as u32);
        mines_arr.copy_from(&layout.mines.cells);
        js_sys::Reflect::set(&obj, &"mines".into(), &mines_arr.into()).unwrap();

        let numbers_arr = js_sys::Int8Array::new_with_length(layout.numbers.cells.len() as u32);
        numbers_arr.copy_from(&layout.numbers.cells);
        js_sys::Reflect::set(&obj, &"numbers".into(), &numbers_arr.into()).unwrap();

        obj.into()
    }

    /// Calculate neighbor mine counts for all cells.
    #[wasm_bindgen(js_name = "calculateNumbers")]
    pub fn wasm_calculate_numbers(
        width: usize,
        height: usize,
        mines_flat: &[u8],
    ) -> js_sys::Int8Array {
        let mines = Mines {
            width,
            height,
            cells: mines_flat.to_vec(),
        };
        let nc = NeighborCache::new(width, height);
        let numbers = board::calculate_numbers(&mines, &nc);

        let arr = js_sys::Int8Array::new_with_length(numbers.cells.len() as u32);
        arr.copy_from(&numbers.cells);
        arr
    }

    /// Ping function to verify WASM is loaded.
    #[wasm_bindgen(js_name = "ping")]
    pub fn wasm_ping() -> String {
        "mines engine ready".to_string()
    }
}
