//! Layer-change G-code for the tower.
//!
//! The output uses the slicer macro language understood by PrusaSlicer
//! (and its forks): a single `{if}`/`{elsif}`/`{endif}` chain keyed on
//! `layer_z`, meant to be pasted into the "Before layer change G-code"
//! field of the printer profile.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TowerError};
use crate::sequence::TemperatureSequence;

const HEADER: &str = "; Copy/paste below to BEFORE_LAYER change area.\n\
                      ;\n\
                      ; On slic3r-prusa3d, look for 'Before layer change G-code' under\n\
                      ; 'Printer Settings', 'Custom G-code' panel\n";

/// Vertical placement of the tower blocks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandLayout {
    /// Height above the bed where the first block starts (mm).
    pub base_offset: f64,
    /// Height of each block (mm).
    pub band_height: f64,
}

impl Default for BandLayout {
    fn default() -> Self {
        Self {
            base_offset: 1.4,
            band_height: 10.0,
        }
    }
}

impl BandLayout {
    /// Validate layout.
    pub fn validate(&self) -> Result<()> {
        if !self.base_offset.is_finite() || self.base_offset < 0.0 {
            return Err(TowerError::InvalidInput(
                "base_offset must be zero or positive".into(),
            ));
        }
        if !self.band_height.is_finite() || self.band_height <= 0.0 {
            return Err(TowerError::InvalidInput(
                "band_height must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Z range `[low, high)` of the 1-indexed block `number`.
    ///
    /// Block numbers start at 1; `0` is treated as the first block.
    pub fn band(&self, number: usize) -> (f64, f64) {
        let low = self
            .band_height
            .mul_add(number.saturating_sub(1) as f64, self.base_offset);
        (low, low + self.band_height)
    }
}

/// Heater command used to change the hotend temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeaterCommand {
    /// `M104`: set the target and keep printing.
    #[default]
    Set,
    /// `M109`: set the target and wait until it is reached.
    SetAndWait,
}

impl HeaterCommand {
    /// G-code mnemonic.
    pub fn code(&self) -> &'static str {
        match self {
            HeaterCommand::Set => "M104",
            HeaterCommand::SetAndWait => "M109",
        }
    }
}

/// Render the layer-change instructions for every block of the tower.
pub fn render_instructions(
    sequence: &TemperatureSequence,
    layout: &BandLayout,
    heater: HeaterCommand,
) -> String {
    let mut out = String::with_capacity(HEADER.len() + sequence.len() * 80);
    out.push_str(HEADER);

    for block in sequence.blocks() {
        let cond = if block.number == 1 { "if" } else { "elsif" };
        let (low, high) = layout.band(block.number);
        // Writing to a String cannot fail
        let _ = write!(
            out,
            "{{{cond} layer_z>={} and layer_z<{}}}\n\
             ; T tower block {} - {}C\n\
             {} S{}\n",
            format_mm(low),
            format_mm(high),
            block.number,
            block.temperature,
            heater.code(),
            block.temperature,
        );
    }

    out.push_str("{endif}\n");
    out
}

/// Write rendered instructions to `path`.
pub fn write_instructions(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).map_err(|source| TowerError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), bytes = text.len(), "Wrote layer-change G-code");
    Ok(())
}

/// Format a height with at most three decimals and no trailing zeros.
fn format_mm(value: f64) -> String {
    let fixed = format!("{value:.3}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".into()
    } else {
        trimmed.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn render(bottom: i32, top: i32, step: i32) -> String {
        let seq = TemperatureSequence::derive(bottom, top, step).unwrap();
        render_instructions(&seq, &BandLayout::default(), HeaterCommand::Set)
    }

    #[test]
    fn test_band_lower_bounds() {
        let layout = BandLayout::default();
        for k in 1..=30 {
            let (low, high) = layout.band(k);
            assert_relative_eq!(low, 1.4 + 10.0 * (k as f64 - 1.0), epsilon = 1e-9);
            assert_relative_eq!(high - low, 10.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_band_zero_is_first_block() {
        let layout = BandLayout::default();
        assert_eq!(layout.band(0), layout.band(1));
    }

    #[test]
    fn test_format_mm() {
        assert_eq!(format_mm(1.4), "1.4");
        assert_eq!(format_mm(11.4), "11.4");
        assert_eq!(format_mm(291.4), "291.4");
        assert_eq!(format_mm(10.0), "10");
        assert_eq!(format_mm(0.25), "0.25");
        assert_eq!(format_mm(0.0), "0");
    }

    #[test]
    fn test_descending_instructions() {
        let text = render(250, 230, 5);
        let expected = format!(
            "{HEADER}\
             {{if layer_z>=1.4 and layer_z<11.4}}\n; T tower block 1 - 250C\nM104 S250\n\
             {{elsif layer_z>=11.4 and layer_z<21.4}}\n; T tower block 2 - 245C\nM104 S245\n\
             {{elsif layer_z>=21.4 and layer_z<31.4}}\n; T tower block 3 - 240C\nM104 S240\n\
             {{elsif layer_z>=31.4 and layer_z<41.4}}\n; T tower block 4 - 235C\nM104 S235\n\
             {{elsif layer_z>=41.4 and layer_z<51.4}}\n; T tower block 5 - 230C\nM104 S230\n\
             {{endif}}\n"
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_clause_counts() {
        let text = render(235, 245, 1);
        let ifs = text.lines().filter(|l| l.starts_with("{if ")).count();
        let elsifs = text.lines().filter(|l| l.starts_with("{elsif ")).count();
        let endifs = text.lines().filter(|l| *l == "{endif}").count();
        assert_eq!(ifs, 1);
        assert_eq!(elsifs, 10);
        assert_eq!(endifs, 1);
        assert!(text.ends_with("; T tower block 11 - 245C\nM104 S245\n{endif}\n"));
    }

    #[test]
    fn test_single_block() {
        let text = render(240, 240, 5);
        assert!(text.contains("{if layer_z>=1.4 and layer_z<11.4}\n"));
        assert!(!text.contains("elsif"));
        assert!(text.ends_with("M104 S240\n{endif}\n"));
    }

    #[test]
    fn test_wait_heater_and_custom_layout() {
        let seq = TemperatureSequence::derive(200, 210, 10).unwrap();
        let layout = BandLayout {
            base_offset: 0.6,
            band_height: 7.5,
        };
        let text = render_instructions(&seq, &layout, HeaterCommand::SetAndWait);
        assert!(text.contains("{if layer_z>=0.6 and layer_z<8.1}\n; T tower block 1 - 200C\nM109 S200\n"));
        assert!(text.contains("{elsif layer_z>=8.1 and layer_z<15.6}\n; T tower block 2 - 210C\nM109 S210\n"));
        assert!(!text.contains("M104"));
    }

    #[test]
    fn test_invalid_layout() {
        let layout = BandLayout {
            band_height: 0.0,
            ..Default::default()
        };
        assert!(layout.validate().is_err());

        let layout = BandLayout {
            base_offset: -1.0,
            ..Default::default()
        };
        assert!(layout.validate().is_err());
        assert!(BandLayout::default().validate().is_ok());
    }
}
