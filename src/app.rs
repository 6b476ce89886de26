//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - reads (or synthesizes) contours
//! - runs the fits in parallel
//! - prints reports and writes optional logs/exports

use std::fs::File;
use std::io::Write;
use std::path::Path;

use clap::Parser;

use crate::cli::{Command, DemoArgs, FitArgs, OutputArgs, PhysicalArgs, TuningArgs};
use crate::data::SyntheticDrop;
use crate::derived::DerivedPropertiesCalculator;
use crate::domain::{DropKind, FitParameters, PhysicalConstants};
use crate::error::AppError;
use crate::fit::FitConfig;

pub mod pipeline;

use pipeline::{FitJob, FitOutcome, RunSettings};

/// Entry point for the `ylfit` binary.
pub fn run() -> Result<(), AppError> {
    // Physical constants may be supplied through `.env`.
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let settings = run_settings(&args.tuning, &args.physical, &args.output)?;
    let drop_kind = args
        .drop_kind
        .unwrap_or_else(|| settings.constants.drop_kind());

    let mut jobs = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let ingested = crate::io::contour::load_contour(path)?;
        for err in &ingested.row_errors {
            log::debug!("{}:{}: {}", path.display(), err.line, err.message);
        }
        jobs.push(FitJob {
            source: path.display().to_string(),
            points: ingested.points,
            drop_kind,
            y_down: !args.y_up,
        });
    }

    let calculator = DerivedPropertiesCalculator::new();
    let outcomes = pipeline::run_batch(&jobs, &settings, &calculator);
    log::debug!(
        "derived-property integrations: {} for {} fits",
        calculator.integration_count(),
        outcomes.len()
    );
    emit(&outcomes, &args.output)
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let settings = run_settings(&args.tuning, &args.physical, &args.output)?;
    let drop = SyntheticDrop {
        params: FitParameters {
            apex_x: 320.0,
            apex_y: 80.0,
            apex_radius: args.apex_radius,
            bond: args.bond,
            rotation: args.rotation.to_radians(),
        },
        max_arc_length: args.arc_length,
        points_per_side: args.points,
        noise_px: args.noise,
        seed: args.seed,
    };
    let points = drop.generate()?;

    let job = FitJob {
        source: format!(
            "synthetic (Bond {}, apex radius {} px, noise {} px)",
            args.bond, args.apex_radius, args.noise
        ),
        points,
        drop_kind: DropKind::Pendant,
        y_down: false,
    };
    let calculator = DerivedPropertiesCalculator::new();
    let outcome = pipeline::run_fit(&job, &settings, &calculator);
    emit(std::slice::from_ref(&outcome), &args.output)
}

fn run_settings(
    tuning: &TuningArgs,
    physical: &PhysicalArgs,
    output: &OutputArgs,
) -> Result<RunSettings, AppError> {
    let config = fit_config_from_args(tuning);
    config.validate()?;
    let constants = physical_constants_from_args(physical);
    constants.validate()?;
    Ok(RunSettings {
        config,
        constants,
        top_n: output.top,
    })
}

pub fn fit_config_from_args(args: &TuningArgs) -> FitConfig {
    FitConfig {
        delta_tol: args.delta_tol,
        gradient_tol: args.gradient_tol,
        objective_tol: args.objective_tol,
        max_fitting_steps: args.max_steps,
        profile_samples: args.profile_samples,
        ..FitConfig::default()
    }
}

pub fn physical_constants_from_args(args: &PhysicalArgs) -> PhysicalConstants {
    PhysicalConstants {
        needle_width_mm: args.needle_width,
        drop_density: args.drop_density,
        continuous_density: args.continuous_density,
        gravity: args.gravity,
        pixel_scale_mm: args.pixel_scale,
    }
}

/// Print reports, write the progress log and exports, and turn failures into an exit code.
fn emit(outcomes: &[FitOutcome], output: &OutputArgs) -> Result<(), AppError> {
    if output.json {
        let reports: Vec<_> = outcomes.iter().map(|o| o.report.clone()).collect();
        println!("{}", crate::report::format_json(&reports)?);
    } else {
        for outcome in outcomes {
            println!("{}", crate::report::format_report(&outcome.report));
        }
    }

    if let Some(path) = &output.log {
        write_log(path, outcomes)?;
    }

    if let Some(dir) = &output.export {
        std::fs::create_dir_all(dir).map_err(|e| {
            AppError::new(2, format!("Failed to create export dir '{}': {e}", dir.display()))
        })?;
        for (i, outcome) in outcomes.iter().enumerate() {
            let stem = export_stem(&outcome.report.source, i);
            crate::io::export::write_residuals_csv(
                &dir.join(format!("{stem}.residuals.csv")),
                &outcome.residuals,
            )?;
            if !outcome.fitted.is_empty() {
                crate::io::export::write_points_csv(&dir.join(format!("{stem}.fit.csv")), &outcome.fitted)?;
            }
        }
    }

    let failed = outcomes.iter().filter(|o| !o.converged()).count();
    if failed > 0 {
        return Err(AppError::new(
            4,
            format!("{failed} of {} fits did not converge.", outcomes.len()),
        ));
    }
    Ok(())
}

fn write_log(path: &Path, outcomes: &[FitOutcome]) -> Result<(), AppError> {
    let mut text = String::new();
    for outcome in outcomes {
        text.push_str(&format!("# {}\n", outcome.report.source));
        text.push_str(&outcome.log);
        text.push('\n');
    }

    if path.as_os_str() == "-" {
        eprint!("{text}");
        return Ok(());
    }
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create log '{}': {e}", path.display())))?;
    file.write_all(text.as_bytes())
        .map_err(|e| AppError::new(2, format!("Failed to write log '{}': {e}", path.display())))
}

/// File stem for exports: the input file stem, or `fit<i>` for synthetic input.
fn export_stem(source: &str, index: usize) -> String {
    Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| source.ends_with(".csv") && !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("fit{index}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_stem_prefers_the_input_name() {
        assert_eq!(export_stem("data/drop_01.csv", 0), "drop_01");
        assert_eq!(export_stem("synthetic (Bond 0.5)", 3), "fit3");
    }

    #[test]
    fn tuning_args_override_defaults_only_where_exposed() {
        let args = TuningArgs {
            delta_tol: 1e-6,
            gradient_tol: 1e-7,
            objective_tol: 1e-9,
            max_steps: 12,
            profile_samples: 2000,
        };
        let config = fit_config_from_args(&args);
        assert_eq!(config.max_fitting_steps, 12);
        assert_eq!(config.profile_samples, 2000);
        assert_eq!(config.arclength_tol, FitConfig::default().arclength_tol);
    }
}
