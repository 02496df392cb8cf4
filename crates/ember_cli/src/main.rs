//! EMBER command line entry point.

mod output;
mod selftest;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, LevelFilter};

/// Log levels accepted on the command line.
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Parser)]
#[command(name = "ember")]
#[command(about = "A physically based Monte Carlo renderer")]
struct Args {
    /// Scene stream to render
    #[arg(short, long)]
    scene: Option<PathBuf>,

    /// Output image (.exr for linear HDR, .png for an sRGB preview)
    #[arg(short, long, default_value = "output.exr")]
    output: PathBuf,

    /// Run the embedded property tests and exit
    #[arg(long)]
    unittest: bool,

    /// Logging verbosity
    #[arg(long, default_value = "info")]
    debug_level: LogLevel,
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_default_env()
        .filter_level(args.debug_level.clone().into())
        .init();

    if args.unittest {
        let failures = selftest::run();
        return if failures == 0 {
            info!("all embedded tests passed");
            ExitCode::SUCCESS
        } else {
            ExitCode::from(failures.min(255) as u8)
        };
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let scene_path = args
        .scene
        .as_ref()
        .context("no scene given; use --scene <path> (or --unittest)")?;

    let file = File::open(scene_path)
        .with_context(|| format!("opening scene {}", scene_path.display()))?;
    let (scene, settings) = ember_core::load_scene(&mut BufReader::new(file))
        .with_context(|| format!("loading scene {}", scene_path.display()))?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} rendering {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!(
        "{}x{} @ {} spp",
        settings.width, settings.height, settings.samples_per_pixel
    ));
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let start = Instant::now();
    let film = ember_renderer::render(&scene, &settings);
    spinner.finish_and_clear();
    info!("render finished in {:.2?}", start.elapsed());
    if film.dropped_samples() > 0 {
        log::warn!("{} samples dropped as non-finite", film.dropped_samples());
    }

    let data = film.develop(1.0 / settings.samples_per_pixel.max(1) as f32);
    output::save_image(&args.output, &data, settings.width, settings.height)
}
