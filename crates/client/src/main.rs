//! `enhance-client` -- enhance one audio file and save the result.
//!
//! Opens the push channel, uploads `INPUT_FILE` to the provider, logs
//! progress until the completion event arrives and writes the enhanced
//! audio to `OUTPUT_FILE`. See [`ClientConfig::from_env`] for every
//! environment variable.
//!
//! Exit codes: `0` on success, `1` when the job fails or cannot start,
//! `2` on invalid configuration.

use enhance_client::config::ClientConfig;
use enhance_client::runner;
use enhance_core::progress::Phase;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "enhance_client=info,enhance_engine=info,enhance_relay=info";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(2);
    });

    tracing::info!(
        relay_url = %config.relay_url,
        provider_url = %config.provider.url,
        input = %config.input_file.display(),
        "Starting enhance-client",
    );

    match runner::run(&config).await {
        Ok(state) if state.phase == Phase::Complete => {
            tracing::info!(output = %config.output_file.display(), "Done");
        }
        Ok(state) => {
            tracing::error!(
                phase = ?state.phase,
                error = state.error.as_ref().map(|e| e.message.as_str()).unwrap_or("unknown"),
                "Enhancement did not complete",
            );
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "Enhancement run failed");
            std::process::exit(1);
        }
    }
}
