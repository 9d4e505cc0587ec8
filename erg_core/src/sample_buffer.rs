//! Debounce ring for raw (power, cadence, position) observations.
//!
//! A run of samples is only committed to the table when every one of them
//! sits within half a watt bucket and one cadence bucket of the first sample.
//! Anything else means the rider is mid-transition and the run is discarded.

/// One accepted observation. Position is already in table units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub watts: i32,
    pub cadence: i32,
    pub position: i32,
    /// 1-based position of this sample within the current run.
    pub reading_count: usize,
}

/// Result of feeding one observation to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferEvent {
    /// Buffer was empty; this sample starts a new run.
    Seeded,
    /// Appended; `len` samples are now buffered.
    Accepted { len: usize },
    /// Appended and the run is complete. Take `average()` then `reset()`.
    Full,
    /// Out of tolerance: the previous run was dropped and this sample is the new seed.
    Reset { discarded: usize },
}

#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
    capacity: usize,
    watt_tolerance: f32,
    cadence_tolerance: i32,
}

impl SampleBuffer {
    /// `watt_increment` and `cadence_increment` are the table bucket widths.
    pub fn new(capacity: usize, watt_increment: i32, cadence_increment: i32) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            watt_tolerance: watt_increment as f32 / 2.0,
            cadence_tolerance: cadence_increment,
        }
    }

    pub fn from_table_cfg(cfg: &crate::config::TableCfg) -> Self {
        Self::new(
            cfg.power_samples,
            cfg.watt_increment,
            cfg.cadence_increment,
        )
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    fn within_tolerance(&self, seed: &Sample, watts: i32, cadence: i32) -> bool {
        ((watts - seed.watts).abs() as f32) < self.watt_tolerance
            && (cadence - seed.cadence).abs() < self.cadence_tolerance
    }

    fn push(&mut self, watts: i32, cadence: i32, position: i32) {
        let reading_count = self.samples.len() + 1;
        self.samples.push(Sample {
            watts,
            cadence,
            position,
            reading_count,
        });
    }

    pub fn accept(&mut self, watts: i32, cadence: i32, position: i32) -> BufferEvent {
        let Some(seed) = self.samples.first().copied() else {
            self.push(watts, cadence, position);
            return if self.capacity == 1 {
                BufferEvent::Full
            } else {
                BufferEvent::Seeded
            };
        };

        if !self.within_tolerance(&seed, watts, cadence) {
            let discarded = self.samples.len();
            self.reset();
            self.push(watts, cadence, position);
            tracing::trace!(
                target: "power_table",
                discarded,
                watts,
                cadence,
                "sample outside tolerance; buffer reseeded"
            );
            return BufferEvent::Reset { discarded };
        }

        if self.samples.len() >= self.capacity {
            // Caller did not drain a full run; start over from this sample.
            self.reset();
            self.push(watts, cadence, position);
            return BufferEvent::Seeded;
        }

        self.push(watts, cadence, position);
        if self.samples.len() == self.capacity {
            BufferEvent::Full
        } else {
            BufferEvent::Accepted {
                len: self.samples.len(),
            }
        }
    }

    /// Mean (watts, cadence, position) of the buffered run, or `None` when empty.
    pub fn average(&self) -> Option<(f32, f32, f32)> {
        if self.samples.is_empty() {
            return None;
        }
        let n = self.samples.len() as f32;
        let (w, c, p) = self
            .samples
            .iter()
            .fold((0i64, 0i64, 0i64), |(w, c, p), s| {
                (
                    w + i64::from(s.watts),
                    c + i64::from(s.cadence),
                    p + i64::from(s.position),
                )
            });
        Some((w as f32 / n, c as f32 / n, p as f32 / n))
    }
}
