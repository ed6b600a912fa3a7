//! `jobstream` -- trigger backend jobs and watch them finish.
//!
//! Configuration comes from the environment (a `.env` file is loaded when
//! present); see `ClientConfig::from_env` for the variables. Status lines
//! go to stdout, logs to stderr.
//!
//! # Exit codes
//!
//! | Code  | Meaning                                    |
//! |-------|--------------------------------------------|
//! | `0`   | Success; a tracked job completed           |
//! | `1`   | A tracked job failed, or any other error   |
//! | `2`   | The status stream was lost                 |
//! | `130` | Interrupted                                |

use clap::Parser;
use jobstream_cli::args::Cli;
use jobstream_cli::exit_error::ExitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobstream=info,jobstream_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = jobstream_cli::commands::run(cli).await {
        if let Some(exit) = e.downcast_ref::<ExitError>() {
            eprintln!("{}", exit.message);
            std::process::exit(exit.code);
        }
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
