use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use hubsync_core::SyncOutcome;
use hubsync_kubehub::KubeRemote;
use hubsync_manifest::{ExtractorConfig, ManifestStatusExtractor};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "hubsyncctl", version, about = "Run a single hubsync reconciliation against the current kube context")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or repair the channel ManagedClusterView in a managed cluster namespace
    EnsureView {
        /// Managed cluster namespace on the hub
        #[arg(long = "cluster", env = "HUBSYNC_CLUSTER")]
        cluster: String,
    },
    /// Report whether the channel deployment seen through the view is ready
    ViewReady {
        #[arg(long = "cluster", env = "HUBSYNC_CLUSTER")]
        cluster: String,
    },
    /// Extract default channel and current CSV from a PackageManifest
    SyncManifest {
        /// Queue key, e.g. "openshift-marketplace/advanced-cluster-management"
        key: String,
        /// Accepted catalog source (default: HUBSYNC_CATALOG_SOURCE or redhat-operators)
        #[arg(long = "catalog-source")]
        catalog_source: Option<String>,
        /// Run even if the key would not be enqueued by the watch filter
        #[arg(long = "force", action = ArgAction::SetTrue)]
        force: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("HUBSYNC_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("HUBSYNC_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid HUBSYNC_METRICS_ADDR; expected host:port");
        }
    }
}

/// Token cancelled on Ctrl-C so in-flight remote calls return promptly.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received; cancelling reconciliation");
            child.cancel();
        }
    });
    token
}

fn print<T: serde::Serialize>(output: Output, value: &T, human: impl FnOnce() -> String) -> Result<()> {
    match output {
        Output::Human => println!("{}", human()),
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Output::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Result body for a key the enqueue filter turned away.
fn enqueue_rejection(key: &str, watched_package: &str) -> serde_json::Value {
    serde_json::json!({ "filtered": true, "key": key, "watchedPackage": watched_package })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let cancel = ctrl_c_token();

    match cli.command {
        Commands::EnsureView { cluster } => {
            info!(cluster = %cluster, "ensure-view invoked");
            let remote = KubeRemote::try_default().await?;
            let view = hubsync_view::ensure_view(&remote, &cancel, &cluster)
                .await
                .with_context(|| format!("ensuring channel view in {}", cluster))?;
            print(cli.output, &view, || {
                format!(
                    "{}/{} rv={}",
                    view.metadata.namespace.as_deref().unwrap_or("-"),
                    view.metadata.name.as_deref().unwrap_or("-"),
                    view.metadata.resource_version.as_deref().unwrap_or("-")
                )
            })?;
        }
        Commands::ViewReady { cluster } => {
            info!(cluster = %cluster, "view-ready invoked");
            let remote = KubeRemote::try_default().await?;
            let ready = hubsync_view::channel_ready(&remote, &cancel, &cluster)
                .await
                .with_context(|| format!("checking channel view readiness in {}", cluster))?;
            print(cli.output, &serde_json::json!({ "cluster": cluster, "ready": ready }), || {
                format!("{} {}", cluster, if ready { "ready" } else { "not-ready" })
            })?;
        }
        Commands::SyncManifest { key, catalog_source, force } => {
            let mut config = ExtractorConfig::from_env();
            if let Some(src) = catalog_source { config.accepted_catalog_source = src; }
            info!(key = %key, catalog_source = %config.accepted_catalog_source, force, "sync-manifest invoked");
            if !force && !hubsync_manifest::should_enqueue(&key, &config.watched_package) {
                warn!(key = %key, watched = %config.watched_package, "key not accepted by enqueue filter; pass --force to sync anyway");
                print(cli.output, &enqueue_rejection(&key, &config.watched_package), || {
                    format!("skipped: {} is not the watched package {}", key, config.watched_package)
                })?;
                return Ok(());
            }
            let remote = Arc::new(KubeRemote::try_default().await?);
            let (publisher, reader) = hubsync_store::status_store();
            let extractor = ManifestStatusExtractor::new(remote, publisher, config);
            let outcome = extractor
                .sync(&cancel, &key)
                .await
                .with_context(|| format!("syncing packagemanifest {}", key))?;
            match outcome {
                SyncOutcome::Published(_) => {
                    let snap = reader.get().context("store empty after publish")?;
                    print(cli.output, &*snap, || {
                        format!("defaultChannel={} currentCSV={}", snap.facts.default_channel, snap.facts.current_csv)
                    })?;
                }
                SyncOutcome::Filtered { catalog_source } => {
                    print(cli.output, &serde_json::json!({ "filtered": true, "catalogSource": catalog_source }), || {
                        format!("skipped: catalog source {}", catalog_source)
                    })?;
                }
            }
        }
    }

    Ok(())
}
