//! Table file codec and the load/merge/save policy.
//!
//! File layout, little-endian:
//!
//! ```text
//! i32 version
//! i32 stored confidence (sum over all cells)
//! cad_size * watt_size records, row-major (cadence outer, watts inner):
//!     i16 position   (i16::MIN = empty)
//!     i8  confidence
//! ```

use erg_traits::Storage;
use eyre::WrapErr;

use super::{PowerPositionTable, TableCell};
use crate::error::{PersistError, Result};
use crate::hw_error::storage_report;

pub const HEADER_LEN: usize = 8;
pub const RECORD_LEN: usize = 3;
const EMPTY_SENTINEL: i16 = i16::MIN;

/// Decoded table file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedTable {
    pub version: i32,
    pub stored_confidence: i32,
    pub cells: Vec<TableCell>,
}

impl SavedTable {
    pub fn file_len(cells: usize) -> usize {
        HEADER_LEN + cells * RECORD_LEN
    }
}

pub fn encode(table: &PowerPositionTable) -> Vec<u8> {
    let cells = table.cells();
    let mut out = Vec::with_capacity(SavedTable::file_len(cells.len()));
    out.extend_from_slice(&table.cfg().version.to_le_bytes());
    out.extend_from_slice(&table.total_confidence().to_le_bytes());
    for c in cells {
        let pos = c.position.unwrap_or(EMPTY_SENTINEL);
        out.extend_from_slice(&pos.to_le_bytes());
        out.extend_from_slice(&c.confidence.to_le_bytes());
    }
    out
}

/// Decode a table file for a grid of `cells` cells.
///
/// The version is checked before the length so a file from another layout
/// reports the mismatch rather than a truncation.
pub fn decode(
    bytes: &[u8],
    cells: usize,
    expected_version: i32,
) -> std::result::Result<SavedTable, PersistError> {
    let expected = SavedTable::file_len(cells);
    if bytes.len() < HEADER_LEN {
        return Err(PersistError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    let version = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if version != expected_version {
        return Err(PersistError::VersionMismatch {
            expected: expected_version,
            found: version,
        });
    }
    if bytes.len() < expected {
        return Err(PersistError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    let stored_confidence = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let cells = bytes[HEADER_LEN..expected]
        .chunks_exact(RECORD_LEN)
        .map(|r| {
            let pos = i16::from_le_bytes([r[0], r[1]]);
            let conf = i8::from_le_bytes([r[2]]).max(0);
            if pos == EMPTY_SENTINEL {
                TableCell::EMPTY
            } else {
                TableCell {
                    position: Some(pos),
                    confidence: conf,
                }
            }
        })
        .collect();
    Ok(SavedTable {
        version,
        stored_confidence,
        cells,
    })
}

impl PowerPositionTable {
    /// Cells where both this grid and `saved` hold trustworthy observations:
    /// confidence above the reliability threshold on both sides, outside the
    /// lowest watt columns.
    pub fn reliable_overlap(&self, saved: &SavedTable) -> usize {
        let cfg = self.cfg();
        let mut n = 0;
        for k in 0..self.cad_size() {
            for i in cfg.unreliable_watt_buckets..self.watt_size() {
                let idx = k * self.watt_size() + i;
                let (Some(a), Some(s)) = (self.cells().get(idx), saved.cells.get(idx)) else {
                    continue;
                };
                if a.is_populated()
                    && s.is_populated()
                    && a.confidence > cfg.reliable_confidence
                    && s.confidence > cfg.reliable_confidence
                {
                    n += 1;
                }
            }
        }
        n
    }

    /// Replace the grid with `saved`, shifted by the mean difference between
    /// the previous in-memory values and the saved ones over cells both had
    /// observed. Returns the applied offset (0 when nothing overlapped).
    pub fn apply_snapshot(&mut self, saved: &SavedTable) -> i32 {
        let mut sum: i64 = 0;
        let mut n: i64 = 0;
        for (a, s) in self.cells().iter().zip(saved.cells.iter()) {
            if let (true, true, Some(pa), Some(ps)) =
                (a.is_observed(), s.is_observed(), a.position, s.position)
            {
                sum += i64::from(pa) - i64::from(ps);
                n += 1;
            }
        }
        let offset = if n == 0 {
            0
        } else {
            crate::util::clamp_i64_to_i32(((sum as f64) / (n as f64)).round() as i64)
        };
        let cols = self.watt_size();
        for (idx, s) in saved.cells.iter().enumerate().take(self.cells().len()) {
            let cell = match s.position {
                Some(p) => TableCell {
                    position: Some(crate::util::clamp_to_cell(i32::from(p) + offset)),
                    confidence: s.confidence,
                },
                None => TableCell::EMPTY,
            };
            self.set_cell(idx / cols, idx % cols, cell);
        }
        offset
    }
}

/// What happened on the first visit to the table file this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Already loaded (or saved) earlier this session.
    AlreadyLoaded,
    /// No file existed; the active table was written.
    Missing,
    /// File unreadable or from another version; rewritten from the active table.
    Discarded(PersistError),
    /// Saved table is the more reliable one but too few reliable cells match
    /// to align it; kept the active one and retry later.
    InsufficientOverlap { found: usize, needed: usize },
    /// Active table has more total confidence; the file was overwritten.
    ActiveIsBetter { active: i32, stored: i32 },
    Loaded { offset: i32, overlap: usize },
}

/// Owns the storage handle and the session's persistence state.
#[derive(Debug)]
pub struct TableStore<S: Storage> {
    storage: S,
    file_name: String,
    loaded: bool,
    last_save_ms: u64,
    save_interval_ms: u64,
}

impl<S: Storage> TableStore<S> {
    pub fn new(storage: S, cfg: &crate::config::TableCfg) -> Self {
        Self {
            storage,
            file_name: cfg.file_name.clone(),
            loaded: false,
            last_save_ms: 0,
            save_interval_ms: cfg.save_interval_ms,
        }
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Truncate-and-rewrite the table file.
    pub fn save(&mut self, table: &PowerPositionTable, now_ms: u64) -> Result<()> {
        let bytes = encode(table);
        self.storage
            .write(&self.file_name, &bytes)
            .map_err(storage_report)
            .wrap_err_with(|| format!("writing {}", self.file_name))?;
        self.last_save_ms = now_ms;
        self.loaded = true;
        tracing::info!(
            target: "power_table",
            file = %self.file_name,
            observed = table.observed(),
            confidence = table.total_confidence(),
            "table saved"
        );
        Ok(())
    }

    /// Read and decode the table file without touching any grid.
    pub fn read_saved(
        &mut self,
        table: &PowerPositionTable,
    ) -> Result<Option<std::result::Result<SavedTable, PersistError>>> {
        let bytes = self
            .storage
            .read(&self.file_name)
            .map_err(storage_report)
            .wrap_err_with(|| format!("reading {}", self.file_name))?;
        Ok(bytes.map(|b| decode(&b, table.cells().len(), table.cfg().version)))
    }

    /// One-time load with reliability merge, then the throttled timer save.
    pub fn manage_save_state(
        &mut self,
        table: &mut PowerPositionTable,
        now_ms: u64,
    ) -> Result<LoadOutcome> {
        let outcome = if self.loaded {
            LoadOutcome::AlreadyLoaded
        } else {
            match self.load(table, now_ms)? {
                o @ LoadOutcome::InsufficientOverlap { .. } => return Ok(o),
                o => o,
            }
        };

        if now_ms.saturating_sub(self.last_save_ms) > self.save_interval_ms {
            self.save(table, now_ms)?;
        }
        Ok(outcome)
    }

    fn load(&mut self, table: &mut PowerPositionTable, now_ms: u64) -> Result<LoadOutcome> {
        let saved = match self.read_saved(table)? {
            None => {
                tracing::info!(target: "power_table", file = %self.file_name, "no saved table; writing active");
                self.save(table, now_ms)?;
                return Ok(LoadOutcome::Missing);
            }
            Some(Err(e)) => {
                tracing::warn!(target: "power_table", error = %e, "saved table discarded");
                self.save(table, now_ms)?;
                return Ok(LoadOutcome::Discarded(e));
            }
            Some(Ok(s)) => s,
        };

        let active = table.total_confidence();
        if active > saved.stored_confidence {
            tracing::info!(
                target: "power_table",
                active, stored = saved.stored_confidence,
                "active table more reliable than saved; overwriting"
            );
            self.save(table, now_ms)?;
            return Ok(LoadOutcome::ActiveIsBetter {
                active,
                stored: saved.stored_confidence,
            });
        }

        let needed = table.cfg().min_reliable_positions;
        let found = table.reliable_overlap(&saved);
        if found < needed {
            tracing::info!(
                target: "power_table",
                found, needed,
                "not enough matching positions to load saved table"
            );
            return Ok(LoadOutcome::InsufficientOverlap { found, needed });
        }

        let offset = table.apply_snapshot(&saved);
        self.loaded = true;
        tracing::info!(target: "power_table", offset, overlap = found, "saved table loaded");
        Ok(LoadOutcome::Loaded {
            offset,
            overlap: found,
        })
    }

    /// Empty the grid and persist the empty grid.
    pub fn reset(&mut self, table: &mut PowerPositionTable, now_ms: u64) -> Result<()> {
        table.clear();
        tracing::info!(target: "power_table", "table reset");
        self.save(table, now_ms)
    }
}
