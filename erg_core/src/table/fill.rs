//! Grid completion.
//!
//! The line helpers are pure: they take one row, column or diagonal of the
//! grid and return a candidate for slot `j`. The table runs every candidate
//! through `passes_gate` before committing it with confidence 0.

use super::{PowerPositionTable, TableCell};
use crate::util::{clamp_to_cell, div_round_nearest_i32};

fn populated_before(line: &[Option<i16>], j: usize) -> impl Iterator<Item = (usize, i32)> + '_ {
    line[..j.min(line.len())]
        .iter()
        .enumerate()
        .rev()
        .filter_map(|(n, v)| v.map(|p| (n, i32::from(p))))
}

fn populated_after(line: &[Option<i16>], j: usize) -> impl Iterator<Item = (usize, i32)> + '_ {
    let start = (j + 1).min(line.len());
    line[start..]
        .iter()
        .enumerate()
        .filter_map(move |(n, v)| v.map(|p| (start + n, i32::from(p))))
}

/// Linear interpolation at `j` between the nearest populated slots on either side.
pub fn interpolate(line: &[Option<i16>], j: usize) -> Option<i32> {
    let (l, vl) = populated_before(line, j).next()?;
    let (r, vr) = populated_after(line, j).next()?;
    let span = (r - l) as i32;
    Some(vl + div_round_nearest_i32((vr - vl) * (j - l) as i32, span))
}

/// Linear extrapolation at `j` from the two nearest populated slots on one
/// side. Only applies when the other side has no data at all.
pub fn extrapolate(line: &[Option<i16>], j: usize) -> Option<i32> {
    let mut before = populated_before(line, j);
    let mut after = populated_after(line, j);
    match (before.next(), after.next()) {
        (Some((b, vb)), None) => {
            let (a, va) = before.next()?;
            let step = (b - a) as i32;
            Some(vb + div_round_nearest_i32((vb - va) * (j - b) as i32, step))
        }
        (None, Some((c, vc))) => {
            let (d, vd) = after.next()?;
            let step = (d - c) as i32;
            Some(vc - div_round_nearest_i32((vd - vc) * (c - j) as i32, step))
        }
        _ => None,
    }
}

impl PowerPositionTable {
    /// Run the three passes until they stop adding cells. Returns the number
    /// of cells added.
    pub fn complete(&mut self) -> usize {
        let start = self.populated();
        let mut count = start;
        loop {
            self.fill_pass();
            self.extrapolate_pass();
            self.diagonal_pass();
            let now = self.populated();
            if now <= count {
                break;
            }
            count = now;
        }
        count - start
    }

    fn try_commit(&mut self, k: usize, i: usize, candidate: Option<i32>) -> bool {
        let Some(v) = candidate else {
            return false;
        };
        let v = i32::from(clamp_to_cell(v));
        if !self.passes_gate(k, i, v) {
            return false;
        }
        self.set_cell(
            k,
            i,
            TableCell {
                position: Some(v as i16),
                confidence: 0,
            },
        );
        true
    }

    /// Interpolate along rows, then along columns.
    fn fill_pass(&mut self) {
        for k in 0..self.cad_size() {
            for i in 0..self.watt_size() {
                if self.position(k, i).is_none() {
                    let c = interpolate(&self.row_line(k), i);
                    self.try_commit(k, i, c);
                }
            }
        }
        for i in 0..self.watt_size() {
            for k in 0..self.cad_size() {
                if self.position(k, i).is_none() {
                    let c = interpolate(&self.col_line(i), k);
                    self.try_commit(k, i, c);
                }
            }
        }
    }

    fn centroid(&self) -> Option<(usize, usize)> {
        let (mut sk, mut si, mut n) = (0usize, 0usize, 0usize);
        for k in 0..self.cad_size() {
            for i in 0..self.watt_size() {
                if self.position(k, i).is_some() {
                    sk += k;
                    si += i;
                    n += 1;
                }
            }
        }
        (n > 0).then(|| (sk / n, si / n))
    }

    fn extrapolate_cell(&mut self, k: usize, i: usize) -> bool {
        let by_row = extrapolate(&self.row_line(k), i);
        if self.try_commit(k, i, by_row) {
            return true;
        }
        let by_col = extrapolate(&self.col_line(i), k);
        self.try_commit(k, i, by_col)
    }

    /// Extrapolate outward in square rings around the centroid of the data.
    fn extrapolate_pass(&mut self) {
        let Some((ck, ci)) = self.centroid() else {
            return;
        };
        let (rows, cols) = (self.cad_size() as isize, self.watt_size() as isize);
        let (ck, ci) = (ck as isize, ci as isize);
        let reach = ck.max(rows - 1 - ck).max(ci).max(cols - 1 - ci);
        for d in 0..=reach {
            for k in (ck - d)..=(ck + d) {
                for i in (ci - d)..=(ci + d) {
                    let on_ring = (k - ck).abs() == d || (i - ci).abs() == d;
                    if !on_ring || k < 0 || i < 0 || k >= rows || i >= cols {
                        continue;
                    }
                    let (k, i) = (k as usize, i as usize);
                    if self.position(k, i).is_none() {
                        self.extrapolate_cell(k, i);
                    }
                }
            }
        }
    }

    /// Cells on the diagonal through (k, i): falling (`dk == 1`) runs from
    /// low cadence/low watts to high cadence/high watts, rising (`dk == -1`)
    /// from high cadence/low watts to low cadence/high watts. Returns the
    /// line and the slot of (k, i) within it.
    fn diagonal(&self, k: usize, i: usize, dk: isize) -> (Vec<Option<i16>>, usize) {
        let (rows, cols) = (self.cad_size() as isize, self.watt_size() as isize);
        let (mut sk, mut si) = (k as isize, i as isize);
        while sk - dk >= 0 && sk - dk < rows && si > 0 {
            sk -= dk;
            si -= 1;
        }
        let mut line = Vec::new();
        let mut slot = 0;
        let (mut rk, mut ri) = (sk, si);
        while rk >= 0 && rk < rows && ri < cols {
            if rk == k as isize && ri == i as isize {
                slot = line.len();
            }
            line.push(self.position(rk as usize, ri as usize));
            rk += dk;
            ri += 1;
        }
        (line, slot)
    }

    /// Interpolate then extrapolate along both diagonals.
    fn diagonal_pass(&mut self) {
        for k in 0..self.cad_size() {
            for i in 0..self.watt_size() {
                if self.position(k, i).is_some() {
                    continue;
                }
                for dk in [1isize, -1] {
                    let (line, slot) = self.diagonal(k, i, dk);
                    if self.try_commit(k, i, interpolate(&line, slot))
                        || self.try_commit(k, i, extrapolate(&line, slot))
                    {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableCfg;

    #[test]
    fn interpolates_between_nearest_neighbors() {
        let line = [Some(100), None, None, Some(160), None];
        assert_eq!(interpolate(&line, 1), Some(120));
        assert_eq!(interpolate(&line, 2), Some(140));
        assert_eq!(interpolate(&line, 4), None);
        assert_eq!(interpolate(&line, 0), None);
    }

    #[test]
    fn extrapolates_from_one_side_only() {
        let line = [None, Some(100), Some(110), None, None];
        assert_eq!(extrapolate(&line, 4), Some(130));
        assert_eq!(extrapolate(&line, 0), Some(90));
        let bracketed = [Some(100), None, Some(120)];
        assert_eq!(extrapolate(&bracketed, 1), None);
        let lonely = [None, Some(100), None];
        assert_eq!(extrapolate(&lonely, 2), None);
    }

    #[test]
    fn extrapolation_uses_actual_spacing() {
        let line = [Some(100), None, Some(120), None, None];
        assert_eq!(extrapolate(&line, 4), Some(140));
    }

    #[test]
    fn diagonal_slices_include_the_target_cell() {
        let mut t = PowerPositionTable::new(TableCfg {
            cad_size: 3,
            watt_size: 4,
            ..TableCfg::default()
        });
        t.set_cell(0, 1, TableCell::observed(10, 1));
        t.set_cell(2, 3, TableCell::observed(30, 1));
        let (line, slot) = t.diagonal(1, 2, 1);
        assert_eq!(line, vec![Some(10), None, Some(30)]);
        assert_eq!(slot, 1);

        let (rising, slot) = t.diagonal(1, 2, -1);
        assert_eq!(rising.len(), 3);
        assert_eq!(slot, 1);
    }

    #[test]
    fn completion_keeps_rows_monotonic() {
        let mut t = PowerPositionTable::new(TableCfg::default());
        for (w, c, p) in [
            (90.0, 80.0, 300.0),
            (150.0, 80.0, 400.0),
            (240.0, 80.0, 550.0),
            (150.0, 90.0, 350.0),
            (240.0, 90.0, 480.0),
        ] {
            t.insert(w, c, p);
        }
        assert!(t.populated() > 5);
        for k in 0..t.cad_size() {
            let vals: Vec<i16> = t.row_line(k).into_iter().flatten().collect();
            assert!(vals.windows(2).all(|w| w[0] <= w[1]), "row {k}: {vals:?}");
        }
        for i in 0..t.watt_size() {
            let vals: Vec<i16> = t.col_line(i).into_iter().flatten().collect();
            assert!(vals.windows(2).all(|w| w[0] >= w[1]), "col {i}: {vals:?}");
        }
    }

    #[test]
    fn derived_cells_are_provisional() {
        let mut t = PowerPositionTable::new(TableCfg::default());
        for (w, p) in [(60.0, 200.0), (120.0, 300.0), (180.0, 400.0), (240.0, 500.0), (300.0, 600.0)] {
            t.insert(w, 90.0, p);
        }
        let derived = t.cells().iter().filter(|c| c.is_populated() && !c.is_observed()).count();
        assert!(derived > 0);
        assert_eq!(t.cell(6, 3).confidence, 0);
        t.clean();
        assert_eq!(t.populated(), 5);
    }
}
