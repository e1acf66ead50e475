//! Affiliget - rate-limited affiliate product acquisition.
//!
//! The binary's only contract with its caller is a single JSON object on
//! stdout; all diagnostics go to stderr.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if affiliget::cli::is_verbose() {
        "affiliget=info"
    } else {
        "affiliget=warn"
    };

    // Log to stderr so stdout stays machine-parseable JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Run CLI
    std::process::exit(affiliget::cli::run().await);
}
