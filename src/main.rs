//! Entry point for the KMS key observer.
//!
//! Runs a controller that keeps every `EncryptionKey` status in step with
//! the AWS KMS key it names, or prints the resource definition.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, CustomResourceExt, ResourceExt};
use kms_key_observer::config::{self, ObserverConfig};
use kms_key_observer::error::ObserverError;
use kms_key_observer::infra::aws::{KmsKeyDescriptor, StsFederation};
use kms_key_observer::infra::cluster::{KubeResourceStore, KubeTokenIssuer};
use kms_key_observer::reconcile::{PassOutcome, Reconciler};
use kms_key_observer::resource::EncryptionKey;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "kms-key-observer")]
#[command(about = "Mirrors AWS KMS key metadata into EncryptionKey resources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch EncryptionKey resources and reconcile them against KMS
    Run(RunArgs),
    /// Print the EncryptionKey CustomResourceDefinition as JSON
    Crd,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Pin STS and KMS to this region instead of the SDK default
    #[arg(long, env = "KMS_OBSERVER_REGION")]
    region: Option<String>,

    /// Seconds between passes for a healthy resource
    #[arg(long, env = "KMS_OBSERVER_REQUEUE_SECS", default_value_t = 60)]
    requeue_interval_secs: u64,

    /// Upper bound on one pass, external calls included
    #[arg(long, env = "KMS_OBSERVER_PASS_TIMEOUT_SECS", default_value_t = 10)]
    pass_timeout_secs: u64,

    /// Lifetime requested for service-account tokens
    #[arg(long, env = "KMS_OBSERVER_TOKEN_TTL_SECS", default_value_t = 900)]
    token_ttl_secs: u64,

    /// Lifetime requested for assumed-role sessions
    #[arg(long, env = "KMS_OBSERVER_SESSION_DURATION_SECS", default_value_t = config::DEFAULT_SESSION_DURATION_SECS)]
    session_duration_secs: i32,

    /// Role session name, visible in the tenant's CloudTrail
    #[arg(long, env = "KMS_OBSERVER_SESSION_NAME", default_value = config::DEFAULT_SESSION_NAME)]
    session_name: String,

    /// Role assumed when AccountID is a bare account id
    #[arg(long, env = "KMS_OBSERVER_TENANT_ROLE", default_value = config::DEFAULT_TENANT_ROLE_NAME)]
    tenant_role_name: String,

    /// ARN partition used when deriving role ARNs
    #[arg(long, env = "KMS_OBSERVER_PARTITION", default_value = "aws")]
    partition: String,

    /// Delay before retrying a failed pass
    #[arg(long, env = "KMS_OBSERVER_ERROR_BACKOFF_SECS", default_value_t = 15)]
    error_backoff_secs: u64,
}

impl RunArgs {
    fn observer_config(&self) -> Result<ObserverConfig> {
        let cfg = ObserverConfig {
            requeue_interval: Duration::from_secs(self.requeue_interval_secs),
            pass_timeout: Duration::from_secs(self.pass_timeout_secs),
            token_ttl: Duration::from_secs(self.token_ttl_secs),
            session_duration_secs: self.session_duration_secs,
            session_name: self.session_name.clone(),
            tenant_role_name: self.tenant_role_name.clone(),
            partition: self.partition.clone(),
            region: self.region.clone(),
            ..ObserverConfig::default()
        };
        Ok(cfg.validated()?)
    }
}

struct ControllerContext {
    reconciler: Reconciler,
    error_backoff: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/kms_key_observer.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("kms_key_observer.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await?,
        Commands::Crd => {
            println!("{}", serde_json::to_string_pretty(&EncryptionKey::crd())?);
        }
    }

    Ok(())
}

/// Wires the cluster and AWS adapters into a reconciler and drives it until shutdown.
async fn run(args: RunArgs) -> Result<()> {
    let cfg = args.observer_config()?;
    info!(
        region = cfg.region.as_deref().unwrap_or("<sdk default>"),
        requeue_secs = cfg.requeue_interval.as_secs(),
        pass_timeout_secs = cfg.pass_timeout.as_secs(),
        "Starting KMS key observer"
    );

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let sdk_config = aws_config::load_from_env().await;

    let issuer = Arc::new(KubeTokenIssuer::new(client.clone(), cfg.token_ttl)?);
    let reconciler = Reconciler::new(
        Arc::new(KubeResourceStore::new(client.clone())),
        issuer,
        Arc::new(StsFederation::new(&sdk_config, cfg.region.as_deref())),
        Arc::new(KmsKeyDescriptor::new(&sdk_config)),
        cfg,
    )?;
    let ctx = Arc::new(ControllerContext {
        reconciler,
        error_backoff: Duration::from_secs(args.error_backoff_secs),
    });

    let keys: Api<EncryptionKey> = Api::all(client);
    Controller::new(keys, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => debug!(object = %obj, ?action, "Reconciled"),
                Err(e) => warn!(error = %e, "Controller reported an error"),
            }
        })
        .await;

    info!("Controller stopped");
    Ok(())
}

async fn reconcile(obj: Arc<EncryptionKey>, ctx: Arc<ControllerContext>) -> Result<Action, ObserverError> {
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();
    match ctx.reconciler.reconcile_pass(&namespace, &name).await? {
        PassOutcome::Done => Ok(Action::await_change()),
        PassOutcome::Requeue(after) => Ok(Action::requeue(after)),
    }
}

fn error_policy(obj: Arc<EncryptionKey>, err: &ObserverError, ctx: Arc<ControllerContext>) -> Action {
    error!(
        namespace = %obj.namespace().unwrap_or_default(),
        name = %obj.name_any(),
        kind = err.kind(),
        error = %err,
        "Failed to reconcile EncryptionKey"
    );
    Action::requeue(ctx.error_backoff)
}
