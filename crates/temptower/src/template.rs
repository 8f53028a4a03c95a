//! OpenSCAD template rendering.
//!
//! The template is a regular OpenSCAD source in which a handful of lines
//! start with a four character marker. Each marked line is replaced as a
//! whole by a generated line; every other line is copied verbatim.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TowerError};

/// OpenSCAD template file name.
pub const TEMPLATE_FILE: &str = "temperature-tower.openscad.txt";
/// Base plate model file name.
pub const BASE_MODEL_FILE: &str = "temperature-tower-base.stl";
/// Single block model file name.
pub const BLOCK_MODEL_FILE: &str = "temperature-tower-block.stl";

/// Line marker recognized in the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// `TMIN`: bottom temperature.
    MinTemp,
    /// `TMAX`: top temperature.
    MaxTemp,
    /// `STEP`: signed temperature step.
    Step,
    /// `BASE`: base plate import.
    BaseModel,
    /// `BLOK`: block import.
    BlockModel,
}

impl Marker {
    /// All markers.
    pub const ALL: [Marker; 5] = [
        Marker::MinTemp,
        Marker::MaxTemp,
        Marker::Step,
        Marker::BaseModel,
        Marker::BlockModel,
    ];

    /// Four character prefix of the marker.
    pub fn tag(&self) -> &'static str {
        match self {
            Marker::MinTemp => "TMIN",
            Marker::MaxTemp => "TMAX",
            Marker::Step => "STEP",
            Marker::BaseModel => "BASE",
            Marker::BlockModel => "BLOK",
        }
    }

    /// Classify a template line by its first four characters.
    pub fn classify(line: &str) -> Option<Marker> {
        let prefix = line.get(..4)?;
        Self::ALL.into_iter().find(|m| m.tag() == prefix)
    }
}

/// Locations of the files a tower model is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateAssets {
    /// OpenSCAD template.
    pub template: PathBuf,
    /// Base plate STL.
    pub base_model: PathBuf,
    /// Block STL.
    pub block_model: PathBuf,
}

impl TemplateAssets {
    /// Locate the template and both model files in `dir`.
    ///
    /// Fails with [`TowerError::MissingTemplateFile`] naming the first file
    /// that does not exist.
    pub fn locate(dir: &Path) -> Result<Self> {
        let assets = Self {
            template: dir.join(TEMPLATE_FILE),
            base_model: dir.join(BASE_MODEL_FILE),
            block_model: dir.join(BLOCK_MODEL_FILE),
        };
        for path in [&assets.template, &assets.base_model, &assets.block_model] {
            if !path.is_file() {
                return Err(TowerError::MissingTemplateFile { path: path.clone() });
            }
        }
        debug!(dir = %dir.display(), "Located template assets");
        Ok(assets)
    }
}

/// Values substituted into the template.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    /// Bottom temperature.
    pub bottom: i32,
    /// Top temperature.
    pub top: i32,
    /// Signed step between blocks.
    pub signed_step: i32,
    /// Path imported for the base plate.
    pub base_model: PathBuf,
    /// Path imported for each block.
    pub block_model: PathBuf,
}

impl TemplateRenderer {
    /// Create a renderer importing the models from `assets`.
    pub fn new(bottom: i32, top: i32, signed_step: i32, assets: &TemplateAssets) -> Self {
        Self {
            bottom,
            top,
            signed_step,
            base_model: assets.base_model.clone(),
            block_model: assets.block_model.clone(),
        }
    }

    /// Replacement text for a marked line, without line terminator.
    pub fn replacement(&self, marker: Marker) -> String {
        match marker {
            Marker::MinTemp => format!("tmin={};", self.bottom),
            Marker::MaxTemp => format!("tmax={};", self.top),
            Marker::Step => format!("tstep={};", self.signed_step),
            Marker::BaseModel => format!("import(\"{}\");", scad_string(&self.base_model)),
            Marker::BlockModel => format!("import(\"{}\");", scad_string(&self.block_model)),
        }
    }

    /// Render template text.
    ///
    /// Marked lines keep their original terminator, so the output has as
    /// many lines as the input.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + 128);
        for line in template.split_inclusive('\n') {
            let body = line.trim_end_matches(['\n', '\r']);
            match Marker::classify(body) {
                Some(marker) => {
                    out.push_str(&self.replacement(marker));
                    out.push_str(&line[body.len()..]);
                }
                None => out.push_str(line),
            }
        }
        out
    }

    /// Render the template in `assets` and write the result to `output`.
    pub fn render_file(&self, assets: &TemplateAssets, output: &Path) -> Result<PathBuf> {
        let template =
            std::fs::read_to_string(&assets.template).map_err(|source| TowerError::Read {
                path: assets.template.clone(),
                source,
            })?;
        let rendered = self.render(&template);
        std::fs::write(output, rendered).map_err(|source| TowerError::Write {
            path: output.to_path_buf(),
            source,
        })?;
        info!(
            template = %assets.template.display(),
            path = %output.display(),
            "Rendered OpenSCAD template"
        );
        Ok(output.to_path_buf())
    }
}

/// Escape a path for use inside an OpenSCAD string literal.
fn scad_string(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' | '"' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
