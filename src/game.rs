//! The playable game surface over the layout engine.
//!
//! [`Game`] owns the visible grid and the hidden layout, and exposes the
//! actions a host UI drives: reveal, flag, chord, reset, plus state
//! queries. The layout does not exist until the first reveal, which
//! becomes the safe click for generation. State changes are announced
//! through an optional event handler, synchronously and one per change;
//! handlers must not call back into the game.
//!
//! Bad input never panics: geometry is clamped at construction, and
//! out-of-range or out-of-turn actions are no-ops returning `false`.

use crate::board::{self, Layout};
use crate::rng::EngineRng;
use crate::types::{
    is_number, Grid, Mines, NeighborCache, VisibleGrid, FLAGGED, MINE_HIT, MINE_REVEALED,
    UNKNOWN, WRONG_FLAG,
};

/// Lifecycle of one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    /// No layout yet; the first reveal will generate one.
    NotStarted,
    Playing,
    Won,
    Lost,
}

/// Synchronous notifications, one per state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    GameStarted,
    MinesGenerated,
    CellRevealed { x: usize, y: usize, value: i8 },
    CellFlagged { x: usize, y: usize, flagged: bool },
    GameLost { x: usize, y: usize },
    GameWon,
}

type EventHandler = Box<dyn FnMut(GameEvent)>;

pub struct Game {
    width: usize,
    height: usize,
    n_mines: usize,
    ensure_solvable: bool,
    seed: Option<u64>,
    rng: EngineRng,
    neighbor_cache: NeighborCache,
    mines: Option<Mines>,
    numbers: Option<Grid>,
    visible: VisibleGrid,
    status: GameStatus,
    flags: usize,
    handler: Option<EventHandler>,
}

impl Game {
    /// Establish a fresh game; no layout exists yet. Geometry is clamped
    /// to legal bounds: width and height to at least 3, the mine count to
    /// at least 1 and at most `w*h - 9` (the upper bound wins, so a 3×3
    /// board gets zero mines).
    pub fn new(
        width: usize,
        height: usize,
        n_mines: usize,
        seed: Option<u64>,
        ensure_solvable: bool,
    ) -> Self {
        let width = width.max(3);
        let height = height.max(3);
        let n_mines = n_mines.max(1).min(width * height - 9);
        Self {
            width,
            height,
            n_mines,
            ensure_solvable,
            seed,
            rng: seed.map(EngineRng::from_seed).unwrap_or_default(),
            neighbor_cache: NeighborCache::new(width, height),
            mines: None,
            numbers: None,
            visible: VisibleGrid::new(width, height),
            status: GameStatus::NotStarted,
            flags: 0,
            handler: None,
        }
    }

    /// Install the event handler. Replaces any previous one.
    pub fn set_event_handler(&mut self, handler: impl FnMut(GameEvent) + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Open a cell. The first reveal of a game generates the layout with
    /// this cell as the safe click. Returns false when nothing happened.
    pub fn reveal(&mut self, x: usize, y: usize) -> bool {
        if !self.visible.in_bounds(x, y) || self.is_over() {
            return false;
        }

        if self.status == GameStatus::NotStarted {
            Self::notify(&mut self.handler, GameEvent::GameStarted);
            let Layout { mines, numbers, .. } = board::generate_layout(
                self.width,
                self.height,
                self.n_mines,
                x,
                y,
                &mut self.rng,
                self.ensure_solvable,
                &self.neighbor_cache,
            );
            self.mines = Some(mines);
            self.numbers = Some(numbers);
            self.status = GameStatus::Playing;
            Self::notify(&mut self.handler, GameEvent::MinesGenerated);
        }

        if self.visible.get(x, y) != UNKNOWN {
            return false; // already open, or flagged
        }

        if self.mines.as_ref().unwrap().get(x, y) {
            self.lose(x, y);
            return true;
        }

        self.flood_reveal(x, y);
        self.check_win();
        true
    }

    /// Cycle `UNKNOWN` <-> `FLAGGED` on a not-yet-opened cell.
    pub fn toggle_flag(&mut self, x: usize, y: usize) -> bool {
        if !self.visible.in_bounds(x, y) || self.is_over() {
            return false;
        }
        match self.visible.get(x, y) {
            UNKNOWN => {
                self.visible.set(x, y, FLAGGED);
                self.flags += 1;
                Self::notify(&mut self.handler, GameEvent::CellFlagged { x, y, flagged: true });
                true
            }
            FLAGGED => {
                self.visible.set(x, y, UNKNOWN);
                self.flags -= 1;
                Self::notify(&mut self.handler, GameEvent::CellFlagged { x, y, flagged: false });
                true
            }
            _ => false,
        }
    }

    /// On a numeric cell whose flag count matches its value, reveal every
    /// other neighbor. A wrong flag makes this lose the game.
    pub fn chord(&mut self, x: usize, y: usize) -> bool {
        if !self.visible.in_bounds(x, y) || self.status != GameStatus::Playing {
            return false;
        }
        let v = self.visible.get(x, y);
        if !is_number(v) {
            return false;
        }
        let neighbors = self.neighbor_cache.get(x, y).to_vec();
        let flagged = neighbors
            .iter()
            .filter(|&&(nx, ny)| self.visible.get(nx, ny) == FLAGGED)
            .count();
        if flagged != v as usize {
            return false;
        }

        let mut acted = false;
        for (nx, ny) in neighbors {
            if self.visible.get(nx, ny) != UNKNOWN {
                continue;
            }
            acted = true;
            if self.mines.as_ref().unwrap().get(nx, ny) {
                self.lose(nx, ny);
                return true;
            }
            self.flood_reveal(nx, ny);
        }
        if acted {
            self.check_win();
        }
        acted
    }

    /// Start over with the same parameters. The same seed reproduces the
    /// same layout for the same first click.
    pub fn reset(&mut self) {
        self.rng = self.seed.map(EngineRng::from_seed).unwrap_or_default();
        self.mines = None;
        self.numbers = None;
        self.visible = VisibleGrid::new(self.width, self.height);
        self.status = GameStatus::NotStarted;
        self.flags = 0;
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// The clamped mine count this game was configured with.
    pub fn total_mines(&self) -> usize {
        self.n_mines
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// The displayed value of a cell.
    pub fn get_cell(&self, x: usize, y: usize) -> Option<i8> {
        self.visible.in_bounds(x, y).then(|| self.visible.get(x, y))
    }

    /// Whether the hidden layout holds a mine here. False before the
    /// first reveal.
    pub fn is_mine(&self, x: usize, y: usize) -> bool {
        self.visible.in_bounds(x, y)
            && self.mines.as_ref().is_some_and(|m| m.get(x, y))
    }

    pub fn flag_count(&self) -> usize {
        self.flags
    }

    /// Mines not yet accounted for by flags.
    pub fn remaining_mines(&self) -> usize {
        self.n_mines.saturating_sub(self.flags)
    }

    pub fn is_revealed(&self, x: usize, y: usize) -> bool {
        self.get_cell(x, y).is_some_and(is_number)
    }

    pub fn is_flagged(&self, x: usize, y: usize) -> bool {
        self.get_cell(x, y) == Some(FLAGGED)
    }

    pub fn is_hidden(&self, x: usize, y: usize) -> bool {
        self.get_cell(x, y) == Some(UNKNOWN)
    }

    fn is_over(&self) -> bool {
        matches!(self.status, GameStatus::Won | GameStatus::Lost)
    }

    fn notify(handler: &mut Option<EventHandler>, event: GameEvent) {
        if let Some(h) = handler {
            h(event);
        }
    }

    /// Open (x, y) and flood-fill through zero counts.
    fn flood_reveal(&mut self, x: usize, y: usize) {
        let mut stack = vec![(x, y)];
        while let Some((cx, cy)) = stack.pop() {
            if self.visible.get(cx, cy) != UNKNOWN {
                continue;
            }
            let v = self.numbers.as_ref().unwrap().get(cx, cy);
            self.visible.set(cx, cy, v);
            Self::notify(
                &mut self.handler,
                GameEvent::CellRevealed { x: cx, y: cy, value: v },
            );
            if v == 0 {
                for &(nx, ny) in self.neighbor_cache.get(cx, cy) {
                    if self.visible.get(nx, ny) == UNKNOWN {
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }

    fn lose(&mut self, x: usize, y: usize) {
        self.status = GameStatus::Lost;
        let mines = self.mines.as_ref().unwrap();
        for cx in 0..self.width {
            for cy in 0..self.height {
                let v = self.visible.get(cx, cy);
                if mines.get(cx, cy) {
                    if v == UNKNOWN {
                        self.visible.set(cx, cy, MINE_REVEALED);
                    }
                } else if v == FLAGGED {
                    self.visible.set(cx, cy, WRONG_FLAG);
                }
            }
        }
        self.visible.set(x, y, MINE_HIT);
        Self::notify(&mut self.handler, GameEvent::GameLost { x, y });
    }

    /// If every non-mine cell is open, the game is won; the engine flags
    /// the remaining mines itself.
    fn check_win(&mut self) {
        let opened = self
            .visible
            .cells
            .iter()
            .filter(|&&v| is_number(v))
            .count();
        if opened != self.width * self.height - self.n_mines {
            return;
        }
        self.status = GameStatus::Won;
        for x in 0..self.width {
            for y in 0..self.height {
                if self.visible.get(x, y) == UNKNOWN {
                    self.visible.set(x, y, FLAGGED);
                    self.flags += 1;
                    Self::notify(
                        &mut self.handler,
                        GameEvent::CellFlagged { x, y, flagged: true },
                    );
                }
            }
        }
        Self::notify(&mut self.handler, GameEvent::GameWon);
    }
}
