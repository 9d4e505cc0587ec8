//! Point queries against the learned grid.

use super::PowerPositionTable;

/// Linear fit through (x1, y1), (x2, y2) evaluated at `x`.
#[inline]
fn line_at(x: f64, (x1, y1): (f64, f64), (x2, y2): (f64, f64)) -> f64 {
    if (x2 - x1).abs() < f64::EPSILON {
        return y1;
    }
    y1 + (y2 - y1) * (x - x1) / (x2 - x1)
}

impl PowerPositionTable {
    /// Actuator position expected to produce `watts` at `cadence`, or `None`
    /// when the table has no basis for an estimate.
    ///
    /// Inside the grid the populated cell is returned directly; a miss is
    /// interpolated from the nearest populated neighbors along the watt axis
    /// and the cadence axis (each pair that exists contributes one estimate,
    /// the estimates are averaged). Outside the grid the two populated
    /// buckets nearest the violated edge are extrapolated linearly.
    pub fn lookup(&self, watts: i32, cadence: i32) -> Option<i32> {
        let raw = self.lookup_table_units(watts, cadence)?;
        let scaled = (raw * f64::from(self.cfg.position_scale)).round();
        Some(scaled.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32)
    }

    fn lookup_table_units(&self, watts: i32, cadence: i32) -> Option<f64> {
        if self.cad_size() == 0 || self.watt_size() == 0 {
            return None;
        }
        let cfg = &self.cfg;
        let last_row = self.cad_size() - 1;
        let last_col = self.watt_size() - 1;
        let col = cfg.watt_bucket(watts as f32).clamp(0, last_col as i64) as usize;

        if cadence < cfg.min_cadence || cadence > cfg.max_cadence() {
            let low = cadence < cfg.min_cadence;
            let v = self.extrapolate_cadence(col, cadence, low);
            if v.is_none() {
                tracing::debug!(target: "power_table", watts, cadence, "lookup: no rows to extrapolate");
            }
            return v;
        }
        let row = cfg.cadence_bucket(cadence as f32).clamp(0, last_row as i64) as usize;

        if watts > cfg.max_watts() || watts < 0 {
            let v = self.extrapolate_watts(row, watts, watts < 0);
            if v.is_none() {
                tracing::debug!(target: "power_table", watts, cadence, "lookup: no columns to extrapolate");
            }
            return v;
        }

        if let Some(p) = self.position(row, col) {
            return Some(f64::from(p));
        }

        let x = f64::from(watts);
        let y = f64::from(cadence);
        let watt_at = |j: usize| f64::from(cfg.watts_of(j));
        let cad_at = |k: usize| f64::from(cfg.cadence_of(k));

        let r1 = match (self.left_of(row, col), self.right_of(row, col)) {
            (Some((l, ql)), Some((r, qr))) => Some(line_at(
                x,
                (watt_at(l), f64::from(ql)),
                (watt_at(r), f64::from(qr)),
            )),
            _ => None,
        };
        let r2 = match (self.above(row, col), self.below(row, col)) {
            (Some((u, qu)), Some((d, qd))) => Some(line_at(
                y,
                (cad_at(u), f64::from(qu)),
                (cad_at(d), f64::from(qd)),
            )),
            _ => None,
        };

        let est: Vec<f64> = [r1, r2].into_iter().flatten().collect();
        if est.is_empty() {
            tracing::debug!(target: "power_table", watts, cadence, "lookup: no data");
            return None;
        }
        let v = est.iter().sum::<f64>() / est.len() as f64;
        tracing::trace!(target: "power_table", watts, cadence, ?r1, ?r2, result = v, "lookup interpolated");
        Some(v)
    }

    /// Two populated rows in `col` nearest the low (or high) cadence edge.
    fn extrapolate_cadence(&self, col: usize, cadence: i32, low: bool) -> Option<f64> {
        let rows: Vec<usize> = if low {
            (0..self.cad_size()).collect()
        } else {
            (0..self.cad_size()).rev().collect()
        };
        let mut hits = rows
            .into_iter()
            .filter_map(|k| self.position(k, col).map(|p| (k, p)));
        let (k1, p1) = hits.next()?;
        let (k2, p2) = hits.next()?;
        let cad = |k: usize| f64::from(self.cfg.cadence_of(k));
        Some(line_at(
            f64::from(cadence),
            (cad(k1), f64::from(p1)),
            (cad(k2), f64::from(p2)),
        ))
    }

    /// Two populated columns in `row` nearest the low (or high) watt edge.
    fn extrapolate_watts(&self, row: usize, watts: i32, low: bool) -> Option<f64> {
        let cols: Vec<usize> = if low {
            (0..self.watt_size()).collect()
        } else {
            (0..self.watt_size()).rev().collect()
        };
        let mut hits = cols
            .into_iter()
            .filter_map(|i| self.position(row, i).map(|p| (i, p)));
        let (i1, p1) = hits.next()?;
        let (i2, p2) = hits.next()?;
        let w = |i: usize| f64::from(self.cfg.watts_of(i));
        Some(line_at(
            f64::from(watts),
            (w(i1), f64::from(p1)),
            (w(i2), f64::from(p2)),
        ))
    }
}
