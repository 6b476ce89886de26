//! Command-line parsing for the Young-Laplace drop fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::DropKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "ylfit", version, about = "Young-Laplace pendant/sessile drop shape fitter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one or more contour CSV files (columns `x`, `y` in pixels).
    Fit(FitArgs),
    /// Generate a synthetic drop contour, fit it and report.
    Demo(DemoArgs),
}

/// Options for fitting contour files.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Contour CSV files. Several files are fitted in parallel.
    #[arg(required = true, value_name = "CSV")]
    pub files: Vec<PathBuf>,

    /// Which way the drop hangs.
    #[arg(long = "drop", value_enum)]
    pub drop_kind: Option<DropKind>,

    /// Input `y` already points up (default: image convention, `y` down).
    #[arg(long)]
    pub y_up: bool,

    #[command(flatten)]
    pub physical: PhysicalArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Options for the synthetic demo.
#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Bond number of the synthetic drop.
    #[arg(long, default_value_t = 0.5, allow_negative_numbers = true)]
    pub bond: f64,

    /// Apex radius (pixels).
    #[arg(long, default_value_t = 50.0)]
    pub apex_radius: f64,

    /// Image rotation (degrees).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub rotation: f64,

    /// Largest dimensionless arc length sampled on each side.
    #[arg(long, default_value_t = 2.5)]
    pub arc_length: f64,

    /// Contour points per side.
    #[arg(long, default_value_t = 150)]
    pub points: usize,

    /// Gaussian pixel noise (standard deviation, pixels).
    #[arg(long, default_value_t = 0.25)]
    pub noise: f64,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[command(flatten)]
    pub physical: PhysicalArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Physical constants; each may also come from the environment or `.env`.
#[derive(Debug, Args, Clone)]
pub struct PhysicalArgs {
    /// Needle outer diameter (mm).
    #[arg(long, env = "YLFIT_NEEDLE_WIDTH", default_value_t = 1.0)]
    pub needle_width: f64,

    /// Drop phase density (kg/m³).
    #[arg(long, env = "YLFIT_DROP_DENSITY", default_value_t = 1000.0)]
    pub drop_density: f64,

    /// Continuous phase density (kg/m³).
    #[arg(long, env = "YLFIT_CONTINUOUS_DENSITY", default_value_t = 1.2)]
    pub continuous_density: f64,

    /// Gravitational acceleration (m/s²).
    #[arg(long, env = "YLFIT_GRAVITY", default_value_t = 9.80035)]
    pub gravity: f64,

    /// Image scale (mm per pixel).
    #[arg(long, env = "YLFIT_PIXEL_SCALE", default_value_t = 0.01)]
    pub pixel_scale: f64,
}

/// Optimizer tolerances and budgets.
#[derive(Debug, Args, Clone)]
pub struct TuningArgs {
    /// Stop when the largest relative parameter step is below this.
    #[arg(long, default_value_t = crate::fit::DELTA_TOL)]
    pub delta_tol: f64,

    /// Stop when the largest gradient component is below this.
    #[arg(long, default_value_t = crate::fit::GRADIENT_TOL)]
    pub gradient_tol: f64,

    /// Stop when the objective (px² per degree of freedom) is below this.
    #[arg(long, default_value_t = crate::fit::OBJECTIVE_TOL)]
    pub objective_tol: f64,

    /// Maximum optimizer iterations.
    #[arg(long, default_value_t = crate::fit::MAXIMUM_FITTING_STEPS)]
    pub max_steps: usize,

    /// Samples of the integrated profile.
    #[arg(long, default_value_t = 5000)]
    pub profile_samples: usize,
}

/// Report and export options.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Print a JSON summary instead of the text report.
    #[arg(long)]
    pub json: bool,

    /// Show the top-N largest residuals on each side.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Write the fit progress log here ("-" for stderr).
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Write per-point residuals and the fitted contour as CSV into this directory.
    #[arg(long, value_name = "DIR")]
    pub export: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_command_parses_files_and_flags() {
        let cli = Cli::try_parse_from([
            "ylfit", "fit", "a.csv", "b.csv", "--drop", "sessile", "--y-up", "--max-steps", "20", "--json",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.drop_kind, Some(DropKind::Sessile));
        assert!(args.y_up);
        assert_eq!(args.tuning.max_steps, 20);
        assert!(args.output.json);
    }

    #[test]
    fn demo_accepts_negative_bond() {
        let cli = Cli::try_parse_from(["ylfit", "demo", "--bond", "-0.2", "--noise", "0"]).unwrap();
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.bond, -0.2);
        assert_eq!(args.noise, 0.0);
    }

    #[test]
    fn fit_requires_a_file() {
        assert!(Cli::try_parse_from(["ylfit", "fit"]).is_err());
    }
}
