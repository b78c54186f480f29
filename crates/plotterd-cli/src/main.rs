use std::process::ExitCode;

use plotterd_core::{config, logging};

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    // config comes first: it decides where logs go
    let cfg = match config::load_or_init() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("plotterd: bad configuration: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init(&cfg.logging) {
        logging::init_stderr(&cfg.logging);
        tracing::warn!("log file unavailable, using stderr: {:#}", err);
    }

    match cli::run(cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("plotterd: {err:#}");
            ExitCode::FAILURE
        }
    }
}
