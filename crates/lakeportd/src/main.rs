// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use lkp_config::{HostConfig, SecretProviderKind, load_host_config};
use lkp_scheduler::{DriverSourceResolver, JobDeps, Scheduler, SchedulerOptions};
use lkp_transform::{StepRegistry, TransformEngine};
use lkp_upload::{BlobConfig, ProviderFactory};
use lkp_vault::{
    PemDirProvider, RestSecretClient, RestSecretConfig, SecretCache, SecretStore,
    TemplateResolver, VaultKv2Client, VaultKv2Config,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lakeportd", version, about = "Scheduled relational-to-columnar ingestion service")]
struct Args {
    /// Path to the host configuration file.
    #[arg(long, default_value = "lakeport.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Enable debug logging for the service's own modules.
    #[arg(long)]
    debug: bool,
}

fn init_tracing(args: &Args) {
    let filter = if args.debug {
        EnvFilter::new("lakeport=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lakeport=info"))
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_secret_store(config: &HostConfig) -> Result<Option<Arc<dyn SecretStore>>> {
    let Some(vault) = &config.vault else {
        return Ok(None);
    };
    let store: Arc<dyn SecretStore> = match vault.provider {
        SecretProviderKind::Vault => {
            let certs = PemDirProvider::new(vault.cert_dir.clone().unwrap_or_default());
            let client = VaultKv2Client::new(
                VaultKv2Config {
                    base_url: vault.base_url.clone(),
                    token: vault.token.clone(),
                    mtls_thumbprint: vault.mtls_thumbprint.clone(),
                    mtls_subject: vault.mtls_subject.clone(),
                    cert_store_name: vault.cert_store_name.clone(),
                    cert_store_location: vault.cert_store_location.clone(),
                },
                &certs,
            )
            .context("building the vault client")?;
            Arc::new(client)
        }
        SecretProviderKind::Rest => Arc::new(
            RestSecretClient::new(RestSecretConfig {
                base_url: vault.base_url.clone(),
                api_key: vault.api_key.clone().unwrap_or_default(),
            })
            .context("building the rest secret client")?,
        ),
    };
    info!(
        target: "lakeport.daemon",
        provider = store.provider_name(),
        "secret store configured"
    );
    Ok(Some(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let (config, warnings) =
        load_host_config(&args.config).with_context(|| format!("loading {}", args.config.display()))?;
    for warning in &warnings {
        warn!(target: "lakeport.daemon", %warning, "configuration warning");
    }

    let resolver = build_secret_store(&config)?
        .map(|store| Arc::new(TemplateResolver::new(store, Arc::new(SecretCache::new()))));

    let blob = config.upload.blob.as_ref().map(|section| BlobConfig {
        endpoint: section.endpoint.clone(),
        region: section.region.clone(),
        bucket: section.bucket.clone(),
        access_key: section.access_key.clone(),
        secret_key: section.secret_key.clone(),
        path_style: section.path_style,
    });

    let datasets_dir = PathBuf::from(&config.service.datasets_dir);
    let deps = Arc::new(JobDeps {
        connections: config.connections.clone(),
        resolver,
        transform_engine: Arc::new(TransformEngine::new(
            Arc::new(StepRegistry::with_builtins()),
            config.service.environment.clone(),
        )),
        providers: Arc::new(ProviderFactory::new(&config.upload.fs_base_path, blob)),
        sources: Arc::new(DriverSourceResolver),
        sql_dir: datasets_dir.clone(),
    });

    let options = SchedulerOptions {
        datasets_dir,
        hot_reload_interval: (config.service.hot_reload_secs > 0)
            .then(|| Duration::from_secs(config.service.hot_reload_secs)),
        shutdown_grace: Duration::from_secs(config.service.shutdown_grace_secs),
    };

    let mut scheduler = Scheduler::new(deps, options);
    scheduler.load_and_register();
    info!(
        target: "lakeport.daemon",
        environment = %config.service.environment,
        datasets = scheduler.registered().len(),
        "lakeportd starting"
    );

    let shutdown = scheduler.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "lakeport.daemon", "interrupt received; shutting down");
            shutdown.cancel();
        }
    });

    scheduler.run().await;
    info!(target: "lakeport.daemon", "lakeportd stopped");
    Ok(())
}
