//! # modlink
//!
//! Command-line front end for the modlink resolution engine.
//!
//! ## Usage
//!
//! ```bash
//! # Resolve everything reachable from two entry units, in order
//! modlink run main.toml extra.toml
//!
//! # Machine-readable report, dependents of failed loads fail too
//! modlink run main.toml --json --failure-policy propagate
//!
//! # Canonical form of a specifier
//! modlink resolve ../lib/util.toml --base file:///srv/app/main.toml
//! ```

use clap::Parser;
use modlink::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // MODLINK_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("MODLINK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "modlink=info,modlink_core=info".into());

    // Logs go to stderr so reports on stdout stay parseable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
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

/// Print the modlink startup banner.
fn print_banner() {
    println!(
        r#"
  modlink v{}
  load once, run in order
"#,
        env!("CARGO_PKG_VERSION")
    );
}
