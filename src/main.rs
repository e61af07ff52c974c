extern crate log;
pub mod config;
pub mod crawler;
pub mod crs;
pub mod db;
pub mod geofile;
pub mod pipeline;
pub mod schedule;
use crate::pipeline::{LiveBackend, Pipeline};
use crate::schedule::{Scheduler, ThreadSleeper};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Periodically harvest GDACS disaster alerts and events into PostGIS tables.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Folder containing the configuration file.
    #[arg(long, default_value = "src/configs/")]
    config_folder: PathBuf,

    /// Name of the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config_file_name: String,

    /// Environment selecting the DB_CONNECTION entry.
    #[arg(long, default_value = "localhost")]
    env: String,

    /// Pause between two runs.
    #[arg(long, default_value_t = 86400)]
    interval_seconds: u64,
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::try_parse()?;
    log::info!(
        "Ingesting with config {:?} for environment '{}' every {} seconds",
        args.config_folder.join(&args.config_file_name),
        args.env,
        args.interval_seconds
    );

    let pipeline = Pipeline::new(
        LiveBackend,
        &args.config_folder,
        &args.config_file_name,
        &args.env,
    );
    Scheduler::new(Duration::from_secs(args.interval_seconds), ThreadSleeper)
        .run_forever(|_| pipeline.run_iteration())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}
