//! Plansync CLI
//!
//! Binary name: `plansync`

use anyhow::Result;
use plansync::cli::build_cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output on stdout stays parseable JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();
    plansync::cli::handlers::dispatch(&matches).await
}
