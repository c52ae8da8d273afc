//! Year-indexed time series with a fixed horizon.
//!
//! Every series is allocated with `horizon + 1` slots up front. Slots below
//! `recorded` are committed history and read-only; the slot at `recorded` is
//! the staging slot for the year being computed and only accepts additive
//! writes. `commit` closes the staging slot.

use serde::Serialize;

use crate::error::{ConfigError, SimulationError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    slots: Box<[f64]>,
    recorded: usize,
}

impl Series {
    pub fn new(horizon: usize, seed: f64) -> Result<Self, ConfigError> {
        let len = horizon
            .checked_add(1)
            .ok_or(ConfigError::HorizonTooLarge(horizon))?;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(len)
            .map_err(|_| ConfigError::HorizonTooLarge(horizon))?;
        slots.push(seed);
        slots.resize(len, 0.0);
        Ok(Self {
            slots: slots.into_boxed_slice(),
            recorded: 1,
        })
    }

    /// Committed value for `year`, `None` if the year has not been recorded.
    pub fn get(&self, year: usize) -> Option<f64> {
        if year < self.recorded {
            self.slots.get(year).copied()
        } else {
            None
        }
    }

    pub fn history(&self) -> &[f64] {
        &self.slots[..self.recorded]
    }

    pub fn latest(&self) -> f64 {
        self.slots[self.recorded - 1]
    }

    pub fn recorded(&self) -> usize {
        self.recorded
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Value accumulated so far in the staging slot.
    pub fn staged(&self) -> Option<f64> {
        self.slots.get(self.recorded).copied()
    }

    /// Adds `amount` into the slot for `year`, which must be the staging slot.
    pub fn accumulate(&mut self, year: usize, amount: f64) -> Result<(), SimulationError> {
        if year != self.recorded || year >= self.slots.len() {
            return Err(SimulationError::SlotOutOfRange {
                year,
                recorded: self.recorded,
                capacity: self.slots.len(),
            });
        }
        self.slots[year] += amount;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), SimulationError> {
        if self.recorded >= self.slots.len() {
            return Err(SimulationError::SlotOutOfRange {
                year: self.recorded,
                recorded: self.recorded,
                capacity: self.slots.len(),
            });
        }
        self.recorded += 1;
        Ok(())
    }
}
