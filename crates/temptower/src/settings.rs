//! Tower generation settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compiler::OpenScad;
use crate::error::{Result, TowerError};
use crate::gcode::{BandLayout, HeaterCommand};
use crate::sequence::signed_step;

/// Geometry compiler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Compiler executable.
    pub program: String,
    /// Timeout in seconds, unbounded when unset.
    pub timeout_secs: Option<u64>,
    /// Keep the rendered `.openscad.txt` file after compiling.
    pub keep_intermediate: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            program: "openscad".into(),
            timeout_secs: None,
            keep_intermediate: false,
        }
    }
}

impl CompilerSettings {
    /// Build the OpenSCAD invocation for these settings.
    pub fn openscad(&self) -> OpenScad {
        OpenScad::new(self.program.clone())
            .with_timeout(self.timeout_secs.map(Duration::from_secs))
    }
}

/// Everything needed to generate one tower.
///
/// Only the rendering and compiler options are read from a config file; the
/// temperatures always come from the caller, so `bottom`, `top` and `step`
/// are rejected as unknown keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TowerSettings {
    /// Bottom block temperature (°C).
    #[serde(skip)]
    pub bottom: i32,
    /// Top block temperature (°C).
    #[serde(skip)]
    pub top: i32,
    /// Step between blocks (°C); the sign is ignored.
    #[serde(skip)]
    pub step: i32,
    /// Directory holding the template and model files. Defaults to the
    /// directory of the running executable.
    pub template_dir: PathBuf,
    /// Directory receiving the generated files.
    pub output_dir: PathBuf,
    /// Block placement.
    pub layout: BandLayout,
    /// Heater command emitted per block.
    pub heater: HeaterCommand,
    /// Produce the STL model in addition to the G-code.
    pub build_model: bool,
    /// Compiler settings.
    pub compiler: CompilerSettings,
}

impl Default for TowerSettings {
    fn default() -> Self {
        Self {
            bottom: 230,
            top: 200,
            step: 5,
            template_dir: default_template_dir(),
            output_dir: PathBuf::from("."),
            layout: BandLayout::default(),
            heater: HeaterCommand::default(),
            build_model: true,
            compiler: CompilerSettings::default(),
        }
    }
}

/// Templates ship next to the executable.
pub fn default_template_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl TowerSettings {
    /// Settings for a tower from `bottom` to `top` with defaults elsewhere.
    pub fn new(bottom: i32, top: i32, step: i32) -> Self {
        Self {
            bottom,
            top,
            step,
            ..Default::default()
        }
    }

    /// Parse settings from TOML. Missing keys take their default; the tower
    /// temperatures keep their defaults and are meant to be set afterwards.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| TowerError::Config(e.to_string()))
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| TowerError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        signed_step(self.bottom, self.top, self.step)?;
        self.layout.validate()?;
        if self.build_model && self.compiler.program.trim().is_empty() {
            return Err(TowerError::InvalidInput(
                "compiler program must not be empty".into(),
            ));
        }
        if self.compiler.timeout_secs == Some(0) {
            return Err(TowerError::InvalidInput(
                "compiler timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Output file names for these settings.
    pub fn output_names(&self) -> OutputNames {
        OutputNames::new(self.bottom, self.top, self.step.unsigned_abs())
    }
}

/// Deterministic names of the generated files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    stem: String,
}

impl OutputNames {
    /// Names for a tower; `magnitude` is the unsigned step.
    pub fn new(bottom: i32, top: i32, magnitude: u32) -> Self {
        Self {
            stem: format!("temperature-tower-{bottom}-{top}-{magnitude}"),
        }
    }

    /// Layer-change G-code file.
    pub fn instructions(&self) -> String {
        format!("{}.gcode.txt", self.stem)
    }

    /// Rendered OpenSCAD source, removed after compiling.
    pub fn intermediate(&self) -> String {
        format!("{}.openscad.txt", self.stem)
    }

    /// Compiled model.
    pub fn model(&self) -> String {
        format!("{}.stl", self.stem)
    }
}
