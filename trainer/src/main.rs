use std::{env, process, str::FromStr};

use log::{info, warn};
use opt_net::CellKind;
use trainer::TrainerConfig;

fn main() {
    env_logger::init();

    let mut config = TrainerConfig::default();
    if let Some(workers) = env_parse("A3C_WORKERS") {
        config.workers = workers;
    }
    if let Some(steps) = env_parse("A3C_MAX_TIME_STEPS") {
        config.max_time_steps = steps;
    }
    if let Some(freq) = env_parse("A3C_SUMMARY_FREQ") {
        config.summary_freq = freq;
    }
    if let Some(seed) = env_parse("A3C_SEED") {
        config.seed = Some(seed);
    }
    if let Some(cell) = env_parse::<CellKind>("A3C_CELL") {
        config.model.cell = cell;
        config.model.value_cell = cell;
    }
    if let Ok(path) = env::var("A3C_SAVE_PATH") {
        config.save_path = Some(path.into());
    }

    match trainer::train(&config) {
        Ok(report) => {
            info!(global_steps = report.global_steps; "training finished");
        }
        Err(e) => {
            eprintln!("training failed: {e}");
            process::exit(1);
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring invalid value for {key}: {raw}");
            None
        }
    }
}
