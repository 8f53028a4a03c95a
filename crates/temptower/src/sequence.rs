//! Temperature sequence derivation.
//!
//! A tower is a stack of blocks, one per temperature, printed from the
//! bottom temperature towards the top temperature.

use tracing::debug;

use crate::error::{Result, TowerError};

/// Largest tower accepted, in blocks.
pub const MAX_BLOCKS: usize = 1000;

/// Get the step with the sign that moves `bottom` towards `top` by addition.
///
/// The sign of `step` itself is ignored. When `bottom == top` the step is
/// negative, which yields a single-block tower.
pub fn signed_step(bottom: i32, top: i32, step: i32) -> Result<i32> {
    if step == 0 {
        return Err(TowerError::InvalidInput(
            "temperature step must not be zero".into(),
        ));
    }
    let magnitude = step.checked_abs().ok_or_else(|| {
        TowerError::InvalidInput(format!("temperature step {step} is out of range"))
    })?;
    Ok(if bottom < top { magnitude } else { -magnitude })
}

/// One block of the tower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// 1-indexed position from the bottom of the tower.
    pub number: usize,
    /// Hotend temperature (°C).
    pub temperature: i32,
}

/// Ordered block temperatures from bottom to top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemperatureSequence {
    step: i32,
    temperatures: Vec<i32>,
}

impl TemperatureSequence {
    /// Derive the sequence for a tower.
    ///
    /// Starts at `bottom` and advances by the signed step while the next
    /// value does not pass `top`. If `top` is not an exact multiple of the
    /// step away from `bottom`, the last block is the final value short of
    /// `top` and `top` itself is not included.
    pub fn derive(bottom: i32, top: i32, step: i32) -> Result<Self> {
        let step = signed_step(bottom, top, step)?;

        let span = (i64::from(top) - i64::from(bottom)).abs();
        let count = span / i64::from(step).abs() + 1;
        if count > MAX_BLOCKS as i64 {
            return Err(TowerError::InvalidInput(format!(
                "{bottom} to {top} in steps of {} needs {count} blocks, at most {MAX_BLOCKS} are supported",
                step.abs()
            )));
        }
        let temperatures: Vec<i32> = (0..count)
            .map(|i| (i64::from(bottom) + i * i64::from(step)) as i32)
            .collect();

        debug!(
            bottom,
            top,
            step,
            blocks = temperatures.len(),
            "Derived temperature sequence"
        );

        Ok(Self { step, temperatures })
    }

    /// Signed step between consecutive blocks.
    pub fn signed_step(&self) -> i32 {
        self.step
    }

    /// Step magnitude, as used in file names.
    pub fn magnitude(&self) -> i32 {
        self.step.abs()
    }

    /// Block temperatures, bottom first.
    pub fn temperatures(&self) -> &[i32] {
        &self.temperatures
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.temperatures.len()
    }

    /// Always false; a derived sequence holds at least the bottom block.
    pub fn is_empty(&self) -> bool {
        self.temperatures.is_empty()
    }

    /// Iterate blocks from the bottom of the tower.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.temperatures
            .iter()
            .enumerate()
            .map(|(idx, &temperature)| Block {
                number: idx + 1,
                temperature,
            })
    }
}
