//! # occistore - Entity Graph Server
//!
//! The main binary for the occistore entity/link graph store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 apps/occistore (THE BINARY)             │
//! │                                                         │
//! │   ┌─────────────┐              ┌──────────────────┐     │
//! │   │    CLI      │              │ Protocol Adapter │     │
//! │   │   (clap)    │              │     (axum)       │     │
//! │   └──────┬──────┘              └────────┬─────────┘     │
//! │          └──────────────┬───────────────┘               │
//! │                         ▼                               │
//! │                 ┌────────────────┐                      │
//! │                 │ occistore-core │                      │
//! │                 │  (THE STORE)   │                      │
//! │                 └────────────────┘                      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the protocol adapter
//! occistore server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! occistore status
//! occistore --backend redb --database occi.redb list compute
//! occistore export -o snapshot.occi
//! ```

use clap::Parser;
use occistore::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // OCCISTORE_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("OCCISTORE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "occistore=info,occistore_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
   ___   ___ ___ ___  ___ _____ ___  ___ ___
  / _ \ / __/ __|_ _|/ __|_   _/ _ \| _ \ __|
 | (_) | (_| (__ | | \__ \ | || (_) |   / _|
  \___/ \___\___|___||___/ |_| \___/|_|_\___|

  Entity Graph Store v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
