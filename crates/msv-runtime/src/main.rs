//! # MSV
//!
//! Demo process: the `echo` service and the `clock` module on the local
//! bridge.
//!
//! ```text
//! msv run                                  # serve until SIGINT/SIGTERM
//! msv task add -i '{"a": 1, "b": 2}' --live
//! echo '"hi"' | msv task echo -I --live
//! ```

mod demo;

use anyhow::Result;
use clap::Parser;
use msv_runtime::cli::{self, Cli};
use msv_telemetry::{init_tracing, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(&TelemetryConfig::from_env())?;

    let cli = Cli::parse();
    cli::execute(cli, demo::options()).await
}
