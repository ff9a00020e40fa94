//! Key Vault KMS plugin binary.

use std::sync::Arc;

use anyhow::Context;
use kms_common::{init_tracing, TracingConfig};
use kms_plugin::version::BUILD_VERSION;
use kms_plugin::{
    server, shutdown, Config, FileTokenProvider, KeyManagementServiceImpl, KeyVaultClient,
    PrometheusStatsReporter,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    init_tracing(
        &TracingConfig::default()
            .with_log_level(&config.log_level)
            .with_json_output(config.log_format_json),
    )
    .context("failed to initialise tracing")?;

    info!(
        version = BUILD_VERSION,
        vault = %config.key_vault.vault_host(),
        key = %config.key_vault.key_id(),
        managed_hsm = config.key_vault.managed_hsm,
        proxy = config.key_vault.proxy.is_some(),
        "starting Key Vault KMS plugin"
    );

    let tokens = Arc::new(FileTokenProvider::new(&config.access_token_file));
    info!(token_file = %tokens.path().display(), "reading access token from file");
    let kv_client = KeyVaultClient::new(&config.key_vault, tokens)
        .context("failed to create key vault client")?;
    let reporter = PrometheusStatsReporter::new(prometheus::default_registry())
        .context("failed to register metrics")?;

    let service = KeyManagementServiceImpl::new(Arc::new(kv_client), Arc::new(reporter));
    let socket_path = config.socket_path()?;

    server::serve_unix(
        service,
        &socket_path,
        shutdown::wait_for_signal(),
        config.shutdown_timeout,
    )
    .await?;

    info!("shutdown complete");
    Ok(())
}
