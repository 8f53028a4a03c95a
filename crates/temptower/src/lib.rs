#![warn(missing_docs)]

//! Temperature calibration tower generator.
//!
//! A temperature tower is a stack of identical blocks, each printed at a
//! different hotend temperature. This crate produces the two files needed
//! to print one:
//! - layer-change G-code that switches temperature at each block boundary
//! - an STL model, compiled by OpenSCAD from a rendered template
//!
//! # Example
//!
//! ```no_run
//! use temptower::{generate, OpenScad, TowerSettings};
//!
//! let settings = TowerSettings {
//!     template_dir: "/usr/share/temperature-tower".into(),
//!     ..TowerSettings::new(250, 230, 5)
//! };
//! let files = generate(&settings, &OpenScad::default(), |path| {
//!     println!("Creating: {}", path.display());
//! })?;
//! assert!(files.model.is_some());
//! # Ok::<(), temptower::TowerError>(())
//! ```

pub mod compiler;
pub mod error;
pub mod gcode;
pub mod sequence;
pub mod settings;
pub mod template;

pub use compiler::{GeometryCompiler, OpenScad};
pub use error::{Result, TowerError};
pub use gcode::{render_instructions, write_instructions, BandLayout, HeaterCommand};
pub use sequence::{signed_step, Block, TemperatureSequence};
pub use settings::{CompilerSettings, OutputNames, TowerSettings};
pub use template::{Marker, TemplateAssets, TemplateRenderer};

use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Files produced by [`generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFiles {
    /// Layer-change G-code.
    pub instructions: PathBuf,
    /// Compiled model, `None` when model output is disabled.
    pub model: Option<PathBuf>,
}

/// Generate the G-code and model files for a tower.
///
/// `on_create` is called with each file path right before that file is
/// produced. Template assets are located before anything is written, so a
/// missing asset leaves no output behind. The intermediate OpenSCAD file is
/// removed only once the compiler succeeds.
pub fn generate<C, F>(
    settings: &TowerSettings,
    compiler: &C,
    mut on_create: F,
) -> Result<GeneratedFiles>
where
    C: GeometryCompiler + ?Sized,
    F: FnMut(&Path),
{
    settings.validate()?;

    let assets = if settings.build_model {
        Some(TemplateAssets::locate(&settings.template_dir)?)
    } else {
        None
    };

    let sequence = TemperatureSequence::derive(settings.bottom, settings.top, settings.step)?;
    let names = settings.output_names();
    info!(
        bottom = settings.bottom,
        top = settings.top,
        step = sequence.signed_step(),
        blocks = sequence.len(),
        "Generating temperature tower"
    );

    let instructions = settings.output_dir.join(names.instructions());
    on_create(&instructions);
    let text = render_instructions(&sequence, &settings.layout, settings.heater);
    write_instructions(&instructions, &text)?;

    let Some(assets) = assets else {
        return Ok(GeneratedFiles {
            instructions,
            model: None,
        });
    };

    let intermediate = settings.output_dir.join(names.intermediate());
    on_create(&intermediate);
    let renderer = TemplateRenderer::new(
        settings.bottom,
        settings.top,
        sequence.signed_step(),
        &assets,
    );
    renderer.render_file(&assets, &intermediate)?;

    let model = settings.output_dir.join(names.model());
    on_create(&model);
    if let Err(err) = compiler.compile(&intermediate, &model) {
        warn!(
            path = %intermediate.display(),
            "Compilation failed, keeping intermediate file"
        );
        return Err(err);
    }

    if !settings.compiler.keep_intermediate {
        std::fs::remove_file(&intermediate).map_err(|source| TowerError::Write {
            path: intermediate.clone(),
            source,
        })?;
    }

    Ok(GeneratedFiles {
        instructions,
        model: Some(model),
    })
}
