use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pyprov_config::BuildContext;
use pyprov_engine::{BuildMetadata, BuildOutput, ConsoleOutput, ProvisionError, Provisioner};
use pyprov_fetch::{ArtifactClient, RetryConfig};

/// `EnvFilter` directives for diagnostics, e.g. `PYPROV_LOG=pyprov_fetch=debug`.
const LOG_ENV: &str = "PYPROV_LOG";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout belongs to the build log; diagnostics go to stderr, uncoloured.
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();
}

async fn run() -> Result<()> {
    let ctx = BuildContext::from_env().context("Failed to load the build configuration")?;
    let metadata = BuildMetadata::open(ctx.metadata_file());
    let client =
        ArtifactClient::new(RetryConfig::default()).context("Failed to set up the HTTP client")?;

    let mut provisioner = Provisioner::new(ctx, client, ConsoleOutput, metadata);
    let outcome = provisioner.run().await?;
    tracing::info!(
        version = %outcome.version,
        installed = outcome.installed,
        cache = ?outcome.cache_state,
        "Python runtime ready"
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Provisioning failures have already been reported by the provisioner.
            if err.downcast_ref::<ProvisionError>().is_none() {
                ConsoleOutput.warn(&format!("{err:#}"));
            }
            tracing::debug!(error = ?err, "Build step failed");
            ExitCode::FAILURE
        }
    }
}
