//! In-memory collaborators for tests, benches and the simulator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use erg_traits::{Actuator, BoxError, Storage};

/// Named-file store held in memory. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemStorage {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
}

impl MemStorage {
    fn files(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        match self.files.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files().get(name).cloned()
    }

    pub fn put(&self, name: &str, bytes: Vec<u8>) {
        self.files().insert(name.to_string(), bytes);
    }

    /// Number of `write` calls seen so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Storage for MemStorage {
    fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(self.get(name))
    }

    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<(), BoxError> {
        self.put(name, bytes.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), BoxError> {
        self.files().remove(name);
        Ok(())
    }
}

/// Actuator that reaches any target instantly and records every command.
#[derive(Debug, Clone, Default)]
pub struct InstantActuator {
    inner: Arc<Mutex<InstantState>>,
}

#[derive(Debug, Default)]
struct InstantState {
    target: i32,
    current: i32,
    releases: u32,
    limits: Option<(i32, i32)>,
    /// Polls left before `current` catches up with `target`.
    lag_polls: u32,
    lag_remaining: u32,
    failing_reads: u32,
}

impl InstantActuator {
    fn state(&self) -> MutexGuard<'_, InstantState> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    pub fn at(position: i32) -> Self {
        let a = Self::default();
        {
            let mut s = a.state();
            s.target = position;
            s.current = position;
        }
        a
    }

    /// Make `current_position` trail a new target for `polls` reads.
    pub fn with_lag(self, polls: u32) -> Self {
        self.state().lag_polls = polls;
        self
    }

    /// Make the next `reads` position reads fail.
    pub fn fail_next_reads(&self, reads: u32) {
        self.state().failing_reads = reads;
    }

    pub fn releases(&self) -> u32 {
        self.state().releases
    }

    pub fn limits(&self) -> Option<(i32, i32)> {
        self.state().limits
    }

    pub fn target(&self) -> i32 {
        self.state().target
    }

    pub fn set_current(&self, position: i32) {
        self.state().current = position;
    }
}

impl Actuator for InstantActuator {
    fn set_target_position(&mut self, position: i32) -> Result<(), BoxError> {
        let mut s = self.state();
        s.target = position;
        s.lag_remaining = s.lag_polls;
        Ok(())
    }

    fn target_position(&self) -> i32 {
        self.state().target
    }

    fn current_position(&mut self) -> Result<i32, BoxError> {
        let mut s = self.state();
        if s.failing_reads > 0 {
            s.failing_reads -= 1;
            return Err("position read failed".into());
        }
        if s.lag_remaining > 0 {
            s.lag_remaining -= 1;
        } else {
            s.current = s.target;
        }
        Ok(s.current)
    }

    fn release_tension(&mut self) -> Result<(), BoxError> {
        self.state().releases += 1;
        Ok(())
    }

    fn set_travel_limits(&mut self, min: i32, max: i32) -> Result<(), BoxError> {
        self.state().limits = Some((min, max));
        Ok(())
    }
}
