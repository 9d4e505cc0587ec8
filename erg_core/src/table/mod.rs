//! Learned (cadence, power) -> actuator position surface.
//!
//! The grid is `cad_size` rows (cadence buckets) by `watt_size` columns (watt
//! buckets). Every cell holds an optional position in table units (actuator
//! units divided by `position_scale`) and a confidence count.
//!
//! Invariant: along a row, populated positions never decrease as the watt
//! bucket increases. Inserts that would break it are vetoed and erode the
//! neighbor that blocked them.
//!
//! Observed cells carry confidence >= 1. Cells derived by the completion
//! passes carry confidence 0 and are wiped before every new observation.

mod fill;
mod lookup;
pub mod persist;

use std::fmt;

use erg_traits::TableObserver;

use crate::config::TableCfg;
use crate::sample_buffer::{BufferEvent, SampleBuffer};
use crate::util::{clamp_to_cell, round_f32_to_i32};

pub use fill::{extrapolate, interpolate};

/// One grid cell. `position == None` is an empty cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCell {
    pub position: Option<i16>,
    pub confidence: i8,
}

impl TableCell {
    pub const EMPTY: TableCell = TableCell {
        position: None,
        confidence: 0,
    };

    pub fn observed(position: i16, confidence: i8) -> Self {
        Self {
            position: Some(position),
            confidence,
        }
    }

    #[inline]
    pub fn is_populated(&self) -> bool {
        self.position.is_some()
    }

    /// Populated from real data rather than by a completion pass.
    #[inline]
    pub fn is_observed(&self) -> bool {
        self.position.is_some() && self.confidence > 0
    }
}

/// Result of committing one averaged observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Bucket index fell outside the grid; nothing changed.
    OutOfRange { row: i64, col: i64 },
    /// The value contradicted a row neighbor; the neighbor lost one confidence.
    Vetoed { row: usize, col: usize },
    Stored {
        row: usize,
        col: usize,
        position: i16,
        confidence: i8,
        /// Cells added by the completion passes after this insert.
        filled: usize,
    },
}

/// Counts from pushing a batch of rows through the insertion gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub stored: usize,
    pub vetoed: usize,
    pub out_of_range: usize,
}

pub struct PowerPositionTable {
    cfg: TableCfg,
    cells: Box<[TableCell]>,
    observer: Option<Box<dyn TableObserver>>,
}

impl fmt::Debug for PowerPositionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerPositionTable")
            .field("rows", &self.cfg.cad_size)
            .field("cols", &self.cfg.watt_size)
            .field("populated", &self.populated())
            .field("observed", &self.observed())
            .finish()
    }
}

impl PowerPositionTable {
    pub fn new(cfg: TableCfg) -> Self {
        let n = cfg.cad_size.saturating_mul(cfg.watt_size);
        Self {
            cells: vec![TableCell::EMPTY; n].into_boxed_slice(),
            cfg,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn TableObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Box<dyn TableObserver>) {
        self.observer = Some(observer);
    }

    #[inline]
    pub fn cfg(&self) -> &TableCfg {
        &self.cfg
    }

    #[inline]
    pub fn cad_size(&self) -> usize {
        self.cfg.cad_size
    }

    #[inline]
    pub fn watt_size(&self) -> usize {
        self.cfg.watt_size
    }

    #[inline]
    fn idx(&self, k: usize, i: usize) -> usize {
        k * self.cfg.watt_size + i
    }

    /// Cell at cadence row `k`, watt column `i`. Out-of-grid reads are empty.
    pub fn cell(&self, k: usize, i: usize) -> TableCell {
        if k >= self.cfg.cad_size || i >= self.cfg.watt_size {
            return TableCell::EMPTY;
        }
        self.cells[self.idx(k, i)]
    }

    #[inline]
    pub fn position(&self, k: usize, i: usize) -> Option<i16> {
        self.cell(k, i).position
    }

    /// Overwrite a cell without the monotonicity gate. Used when restoring
    /// a saved grid.
    pub fn set_cell(&mut self, k: usize, i: usize, cell: TableCell) {
        if k < self.cfg.cad_size && i < self.cfg.watt_size {
            let idx = self.idx(k, i);
            self.cells[idx] = cell;
        }
    }

    pub fn cells(&self) -> &[TableCell] {
        &self.cells
    }

    /// Number of cells holding a position (observed or derived).
    pub fn populated(&self) -> usize {
        self.cells.iter().filter(|c| c.is_populated()).count()
    }

    /// Number of cells holding real observations.
    pub fn observed(&self) -> usize {
        self.cells.iter().filter(|c| c.is_observed()).count()
    }

    /// Sum of confidence over the grid. Written to the table file header and
    /// compared on load.
    pub fn total_confidence(&self) -> i32 {
        self.cells
            .iter()
            .map(|c| i32::from(c.confidence.max(0)))
            .sum()
    }

    /// Positions of row `k`, low watts first.
    pub fn row_line(&self, k: usize) -> Vec<Option<i16>> {
        (0..self.cfg.watt_size).map(|i| self.position(k, i)).collect()
    }

    /// Positions of column `i`, low cadence first.
    pub fn col_line(&self, i: usize) -> Vec<Option<i16>> {
        (0..self.cfg.cad_size).map(|k| self.position(k, i)).collect()
    }

    /// Drop every derived (zero-confidence) value.
    pub fn clean(&mut self) {
        for c in self.cells.iter_mut() {
            if c.confidence < 1 {
                *c = TableCell::EMPTY;
            }
        }
    }

    /// Empty every cell.
    pub fn clear(&mut self) {
        self.cells.fill(TableCell::EMPTY);
    }

    /// Observed cells as (cadence, watts, position) rows, position in
    /// actuator units. Derived cells are left out so an export re-imports
    /// cleanly.
    pub fn rows(&self) -> Vec<erg_config::TableRow> {
        let mut out = Vec::new();
        for k in 0..self.cfg.cad_size {
            for i in 0..self.cfg.watt_size {
                let c = self.cell(k, i);
                if let (true, Some(p)) = (c.is_observed(), c.position) {
                    out.push(erg_config::TableRow {
                        cadence: self.cfg.cadence_of(k),
                        watts: self.cfg.watts_of(i),
                        position: i32::from(p).saturating_mul(self.cfg.position_scale),
                    });
                }
            }
        }
        out
    }

    /// Nearest populated cell left of `i` in row `k`.
    fn left_of(&self, k: usize, i: usize) -> Option<(usize, i16)> {
        (0..i)
            .rev()
            .find_map(|j| self.position(k, j).map(|p| (j, p)))
    }

    fn right_of(&self, k: usize, i: usize) -> Option<(usize, i16)> {
        (i + 1..self.cfg.watt_size).find_map(|j| self.position(k, j).map(|p| (j, p)))
    }

    /// Nearest populated cell at lower cadence in column `i`.
    fn above(&self, k: usize, i: usize) -> Option<(usize, i16)> {
        (0..k)
            .rev()
            .find_map(|r| self.position(r, i).map(|p| (r, p)))
    }

    /// Nearest populated cell at higher cadence in column `i`.
    fn below(&self, k: usize, i: usize) -> Option<(usize, i16)> {
        (k + 1..self.cfg.cad_size).find_map(|r| self.position(r, i).map(|p| (r, p)))
    }

    /// Full neighbor gate for derived values: non-decreasing along the row,
    /// non-increasing along the column (lower cadence needs more resistance
    /// for the same power).
    pub(crate) fn passes_gate(&self, k: usize, i: usize, v: i32) -> bool {
        let left_ok = self.left_of(k, i).is_none_or(|(_, p)| i32::from(p) <= v);
        let right_ok = self.right_of(k, i).is_none_or(|(_, p)| i32::from(p) >= v);
        let up_ok = self.above(k, i).is_none_or(|(_, p)| i32::from(p) >= v);
        let down_ok = self.below(k, i).is_none_or(|(_, p)| i32::from(p) <= v);
        left_ok && right_ok && up_ok && down_ok
    }

    /// Take one confidence from the cell at (k, j); empty it at zero.
    fn erode(&mut self, k: usize, j: usize) {
        let idx = self.idx(k, j);
        let c = &mut self.cells[idx];
        c.confidence = c.confidence.saturating_sub(1);
        if c.confidence <= 0 {
            *c = TableCell::EMPTY;
        }
    }

    /// Commit an averaged observation. `position` is in table units.
    pub fn insert(&mut self, watts: f32, cadence: f32, position: f32) -> InsertOutcome {
        self.clean();

        let col = self.cfg.watt_bucket(watts);
        let row = self.cfg.cadence_bucket(cadence);
        let in_grid = |v: i64, n: usize| v >= 0 && (v as u64) < n as u64;
        if !in_grid(row, self.cfg.cad_size) || !in_grid(col, self.cfg.watt_size) {
            tracing::debug!(
                target: "power_table",
                watts, cadence, row, col,
                "observation outside grid"
            );
            return InsertOutcome::OutOfRange { row, col };
        }
        let (k, i) = (row as usize, col as usize);
        let v = i32::from(clamp_to_cell(round_f32_to_i32(position)));

        let left = self.left_of(k, i);
        let right = self.right_of(k, i);
        let left_bad = left.filter(|&(_, p)| i32::from(p) > v);
        let right_bad = right.filter(|&(_, p)| i32::from(p) < v);
        if left_bad.is_some() || right_bad.is_some() {
            for (j, p) in left_bad.into_iter().chain(right_bad) {
                self.erode(k, j);
                tracing::debug!(
                    target: "power_table",
                    row = k, col = j, neighbor = p, rejected = v,
                    confidence = self.cell(k, j).confidence,
                    "neighbor contradicts observation; eroded"
                );
            }
            return InsertOutcome::Vetoed { row: k, col: i };
        }

        let cap = self.cfg.confidence_cap();
        let idx = self.idx(k, i);
        let cell = self.cells[idx];
        let stored = match cell.position {
            Some(old) if cell.confidence > 0 => {
                let conf = f32::from(cell.confidence);
                let avg = (v as f32 + f32::from(old) * conf) / (conf + 1.0);
                clamp_to_cell(round_f32_to_i32(avg))
            }
            _ => clamp_to_cell(v),
        };
        let confidence = cell.confidence.saturating_add(1).min(cap).max(1);
        self.cells[idx] = TableCell::observed(stored, confidence);
        tracing::debug!(
            target: "power_table",
            row = k, col = i, position = stored, confidence,
            "observation stored"
        );

        let filled = if self.populated() > self.cfg.fill_threshold {
            self.complete()
        } else {
            0
        };

        if let Some(obs) = &self.observer {
            obs.table_row_changed(k);
        }

        InsertOutcome::Stored {
            row: k,
            col: i,
            position: stored,
            confidence,
            filled,
        }
    }

    /// Whether a live reading is usable as an observation at all.
    pub fn accepts_observation(&self, watts: i32, cadence: i32) -> bool {
        let c = &self.cfg;
        let cad_lo = c.min_cadence - c.cadence_increment / 2;
        let cad_hi = c.min_cadence + c.cadence_increment * c.cad_size as i32
            - c.cadence_increment / 2;
        let watt_hi = c.watt_increment * c.watt_size as i32;
        (cad_lo..cad_hi).contains(&cadence) && watts > c.min_plausible_watts && watts < watt_hi
    }

    /// Gate a live reading, feed it to the debounce buffer and commit a full
    /// run. `actuator_position` is in actuator units.
    pub fn process_observation(
        &mut self,
        buffer: &mut SampleBuffer,
        watts: i32,
        cadence: i32,
        actuator_position: i32,
    ) -> Option<InsertOutcome> {
        if !self.accepts_observation(watts, cadence) {
            return None;
        }
        let scale = self.cfg.position_scale.max(1);
        match buffer.accept(watts, cadence, actuator_position / scale) {
            BufferEvent::Full => {
                let (w, c, p) = buffer.average()?;
                buffer.reset();
                let outcome = self.insert(w, c, p);
                tracing::debug!(target: "power_table", "\n{}", self);
                Some(outcome)
            }
            _ => None,
        }
    }

    /// Push externally supplied rows (position in actuator units) through
    /// the same gate as live observations.
    pub fn import_rows(&mut self, rows: &[erg_config::TableRow]) -> ImportSummary {
        let mut summary = ImportSummary::default();
        let scale = self.cfg.position_scale.max(1) as f32;
        for r in rows {
            match self.insert(r.watts as f32, r.cadence as f32, r.position as f32 / scale) {
                InsertOutcome::Stored { .. } => summary.stored += 1,
                InsertOutcome::Vetoed { .. } => summary.vetoed += 1,
                InsertOutcome::OutOfRange { .. } => summary.out_of_range += 1,
            }
        }
        tracing::info!(
            target: "power_table",
            stored = summary.stored,
            vetoed = summary.vetoed,
            out_of_range = summary.out_of_range,
            "rows imported"
        );
        summary
    }
}

impl fmt::Display for PowerPositionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .cells
            .iter()
            .filter_map(|c| c.position)
            .map(|p| p.to_string().len())
            .max()
            .unwrap_or(0)
            .max(4);
        write!(f, "CAD\\W  ")?;
        for i in 0..self.cfg.watt_size {
            write!(f, " | {:>width$}", self.cfg.watts_of(i))?;
        }
        writeln!(f)?;
        for k in 0..self.cfg.cad_size {
            write!(f, "{:>3} rpm", self.cfg.cadence_of(k))?;
            for i in 0..self.cfg.watt_size {
                match self.position(k, i) {
                    Some(p) => write!(f, " | {p:>width$}")?,
                    None => write!(f, " | {:>width$}", "")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
