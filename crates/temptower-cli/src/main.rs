//! temperature-tower CLI - Temperature calibration tower generator
//!
//! Writes the layer-change G-code and the STL model for a tower of blocks
//! printed at stepped hotend temperatures.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use temptower::{HeaterCommand, TowerSettings};
use tracing_subscriber::EnvFilter;

const LONG_ABOUT: &str = "\
Generates the two files required to print a \"temperature tower\" on a 3D
printer from three numbers (BOT_TEMP, TOP_TEMP, TEMP_STEP) and three
template files.

Files produced:

  temperature-tower-BOT_TEMP-TOP_TEMP-STEP.stl
    Printable model of the full tower: a stack of blocks with the
    temperature label on each block.

  temperature-tower-BOT_TEMP-TOP_TEMP-STEP.gcode.txt
    G-code to add to the slicer's 'Before layer change G-code' so the
    temperature changes with layer height.

Requirements:

  OpenSCAD (http://www.openscad.org/) must be runnable from the command
  line; try `openscad --help`.

  The template directory must contain:
    temperature-tower-base.stl     - base plate the tower is built on
    temperature-tower-block.stl    - one tower block
    temperature-tower.openscad.txt - OpenSCAD template instructions";

const EXAMPLES: &str = "\
Examples:

  temperature-tower 250 230 5
      5 blocks: 250 on the bottom, then 245, 240, 235 and 230 on top.

  temperature-tower 235 245 1
      11 blocks: 235 on the bottom, then 236 ... 244 and 245 on top.

  temperature-tower 230 241 5
      3 blocks: 230, 235, 240. A top temperature that is not a whole
      number of steps away is not reached.";

#[derive(Parser, Debug)]
#[command(name = "temperature-tower", version)]
#[command(about = "Generate G-code and STL files for a temperature calibration tower")]
#[command(long_about = LONG_ABOUT, after_long_help = EXAMPLES)]
#[command(allow_negative_numbers = true, arg_required_else_help = true)]
struct Cli {
    /// Temperature (C) of the bottom block
    #[arg(value_name = "BOT_TEMP")]
    bottom: i32,

    /// Temperature (C) of the top block
    #[arg(value_name = "TOP_TEMP")]
    top: i32,

    /// Degrees between blocks (sign is ignored)
    #[arg(value_name = "TEMP_STEP")]
    step: i32,

    /// Directory holding the template and STL parts [default: executable's directory]
    #[arg(long, value_name = "DIR")]
    template_dir: Option<PathBuf>,

    /// Directory to write the generated files to
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// OpenSCAD executable
    #[arg(long, value_name = "PROGRAM", env = "TEMPTOWER_OPENSCAD")]
    openscad: Option<String>,

    /// Kill OpenSCAD if it runs longer than this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Keep the rendered .openscad.txt file
    #[arg(long)]
    keep_intermediate: bool,

    /// Only write the G-code file
    #[arg(long)]
    gcode_only: bool,

    /// Wait for each temperature to be reached (M109 instead of M104)
    #[arg(long)]
    wait: bool,

    /// TOML file with default settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Merge command-line values over the config file and defaults.
    fn settings(&self) -> Result<TowerSettings> {
        let mut settings = match &self.config {
            Some(path) => TowerSettings::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => TowerSettings::default(),
        };

        settings.bottom = self.bottom;
        settings.top = self.top;
        settings.step = self.step;
        if let Some(dir) = &self.template_dir {
            settings.template_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
        if let Some(program) = &self.openscad {
            settings.compiler.program = program.clone();
        }
        if self.timeout.is_some() {
            settings.compiler.timeout_secs = self.timeout;
        }
        if self.keep_intermediate {
            settings.compiler.keep_intermediate = true;
        }
        if self.gcode_only {
            settings.build_model = false;
        }
        if self.wait {
            settings.heater = HeaterCommand::SetAndWait;
        }
        Ok(settings)
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Help requests exit cleanly; usage errors exit with 1.
fn parse_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        _ => 1,
    }
}

fn run(cli: &Cli) -> Result<()> {
    let settings = cli.settings()?;
    let compiler = settings.compiler.openscad();

    let files = temptower::generate(&settings, &compiler, |path| {
        println!("Creating: {}", path.display());
    })
    .with_context(|| {
        format!(
            "generating tower {} -> {} step {}",
            settings.bottom, settings.top, settings.step
        )
    })?;

    tracing::info!(
        instructions = %files.instructions.display(),
        model = ?files.model,
        "Done"
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(parse_exit_code(err.kind()));
        }
    };

    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
