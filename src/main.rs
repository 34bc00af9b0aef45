mod cli;
mod config;
mod logger;
mod pipeline;
mod runner;
mod sandbox;
mod shell;
mod snapshot;
mod spinner;
mod workflow;

use anyhow::Result;
use tracing::{error, info};

fn main() -> Result<()> {
    logger::init()?;
    info!(args = ?std::env::args().collect::<Vec<_>>(), "sandcheck start");

    match cli::run() {
        Ok(result) => {
            info!("sandcheck finished successfully");
            Ok(result)
        }
        Err(err) => {
            error!(error = ?err, "sandcheck failed");
            Err(err)
        }
    }
}
