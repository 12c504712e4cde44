/// main.rs - volcast: command-line driver for the volatility engine
///
/// Model configuration comes from the environment (`VOL_*`, `.env`);
/// the subcommands choose what to run over CSV/Parquet price files.
///
/// Usage:
///   volcast forecast --prices spy.csv --horizon 10 --save-dir models/spy
///   volcast rolling  --prices spy.parquet --window 252 --output rolling.csv
///   volcast evaluate --train train.csv --test test.csv
///   volcast inspect  --model-dir models/spy
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vol_engine::data::load_prices;
use vol_engine::{EngineConfig, FitMode, RollingControl, VolatilityEngine};

#[derive(Parser)]
#[command(name = "volcast")]
#[command(about = "Rolling-window GARCH volatility forecasting")]
#[command(version)]
struct Cli {
    /// Accept the best parameters when the optimizer hits its iteration cap
    #[arg(long, global = true)]
    best_effort: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit on a price file and forecast volatility
    Forecast {
        #[arg(short, long)]
        prices: PathBuf,

        /// Steps ahead (defaults to VOL_FORECAST_HORIZON)
        #[arg(long)]
        horizon: Option<usize>,

        /// Save the fitted parameters to this directory
        #[arg(long)]
        save_dir: Option<PathBuf>,
    },

    /// Re-estimate over a trailing window at every step
    Rolling {
        #[arg(short, long)]
        prices: PathBuf,

        /// Window length (defaults to VOL_ROLLING_WINDOW)
        #[arg(short, long)]
        window: Option<usize>,

        /// Write the table as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Fit slices on one thread
        #[arg(long)]
        sequential: bool,
    },

    /// Fit on one file and score the forecast against another
    Evaluate {
        #[arg(long)]
        train: PathBuf,

        #[arg(long)]
        test: PathBuf,
    },

    /// Show a saved model
    Inspect {
        #[arg(short, long)]
        model_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mode = if cli.best_effort { FitMode::BestEffort } else { FitMode::Strict };

    // ── Config ───────────────────────────────────────────────────────────
    let cfg = EngineConfig::from_env().context("loading VOL_* configuration")?;
    info!(
        "Config: {} horizon={} window={} max_iter={} tol={:.1e}",
        cfg.label(),
        cfg.forecast_horizon,
        cfg.rolling_window,
        cfg.max_iterations,
        cfg.tolerance
    );

    match cli.command {
        Commands::Forecast { prices, horizon, save_dir } => {
            let mut engine = VolatilityEngine::new(cfg)?;
            let data = load_prices(&prices).with_context(|| format!("reading {}", prices.display()))?;
            let fit = engine.train(&data, false, mode)?;

            println!("\n{:<12} {:>14}", "PARAM", "ESTIMATE");
            println!("{}", "─".repeat(27));
            for (name, value) in fit.params() {
                println!("{:<12} {:>14.6}", name, value);
            }
            println!(
                "\nloglik={:.3}  aic={:.3}  bic={:.3}  nobs={}  converged={}",
                fit.log_likelihood(),
                fit.aic(),
                fit.bic(),
                fit.nobs(),
                fit.converged()
            );

            let forecast = engine.forecast(horizon, None)?;
            println!("\nForecast from {}", forecast.origin());
            println!("{:<6} {:>12} {:>12}", "STEP", "VARIANCE", "VOL %");
            for (h, (var, vol)) in forecast
                .variances()
                .iter()
                .zip(forecast.volatility())
                .enumerate()
            {
                println!("{:<6} {:>12.6} {:>12.4}", h + 1, var, vol);
            }

            if let Some(dir) = save_dir {
                let path = engine.save(&dir)?;
                info!("Saved model → {}", path.display());
            }
        }

        Commands::Rolling { prices, window, output, timeout_secs, sequential } => {
            let engine = VolatilityEngine::new(cfg)?;
            let data = load_prices(&prices).with_context(|| format!("reading {}", prices.display()))?;
            let control = RollingControl {
                cancel: None,
                deadline: timeout_secs.map(|s| Instant::now() + Duration::from_secs(s)),
                sequential,
            };
            let table = engine.rolling_forecast_with(&data, window, &control)?;

            match output {
                Some(path) => table.write_csv(&path)?,
                None => println!("{}", table.to_dataframe()?),
            }
        }

        Commands::Evaluate { train, test } => {
            let mut engine = VolatilityEngine::new(cfg)?;
            let train_data = load_prices(&train).with_context(|| format!("reading {}", train.display()))?;
            let test_data = load_prices(&test).with_context(|| format!("reading {}", test.display()))?;
            engine.train(&train_data, false, mode)?;
            let metrics = engine.evaluate(&test_data)?;
            println!("\n{}", metrics);
        }

        Commands::Inspect { model_dir } => {
            let engine = VolatilityEngine::load(&model_dir)?;
            println!("{}", serde_json::to_string_pretty(engine.config())?);
            if let Some(params) = engine.loaded_params() {
                println!("\n{:<12} {:>14}", "PARAM", "ESTIMATE");
                println!("{}", "─".repeat(27));
                for (name, value) in params {
                    println!("{:<12} {:>14.6}", name, value);
                }
            }
        }
    }

    Ok(())
}
