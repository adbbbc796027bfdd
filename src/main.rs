//! Component Operator - runs Component resources as Kubernetes workloads

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DynamicObject, Patch, PatchParams};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, Resource};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use component_operator::config::{LogFormat, OperatorConfig};
use component_operator::controller::{error_policy, reconcile, Context, FIELD_MANAGER};
use component_operator::crd::{Component, Link};
use component_operator::dependent::{registry, task_run_resource, DependentKind};
use component_operator::retry::{retry_with_backoff, RetryConfig};

/// Component Operator - turns Component resources into running workloads
#[derive(Parser, Debug)]
#[command(name = "component-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: OperatorConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Installs the Component and Link CRDs, then watches Components and the
    /// objects they own until a termination signal arrives.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.config.log_format);

    if cli.crd {
        let component = serde_yaml::to_string(&Component::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize Component CRD: {}", e))?;
        let link = serde_yaml::to_string(&Link::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize Link CRD: {}", e))?;
        println!("{component}---\n{link}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => subscriber.with(fmt::layer()).init(),
        LogFormat::Json => subscriber.with(fmt::layer().json()).init(),
    }
}

/// Install or update the operator's CRDs using server-side apply
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing Component CRD...");
    crds.patch(
        "components.halkyon.io",
        &params,
        &Patch::Apply(&Component::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install Component CRD: {}", e))?;

    tracing::info!("Installing Link CRD...");
    crds.patch("links.halkyon.io", &params, &Patch::Apply(&Link::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install Link CRD: {}", e))?;

    tracing::info!("All CRDs installed/updated");
    Ok(())
}

/// Api for `K` in the watched namespace, or across the cluster
fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn scoped_dynamic(client: &Client, namespace: Option<&str>) -> Api<DynamicObject> {
    let ar = task_run_resource();
    match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
        None => Api::all_with(client.clone(), &ar),
    }
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!(
        openshift = config.openshift,
        namespace = config.namespace().unwrap_or("<all>"),
        "Component controller starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    retry_with_backoff(&RetryConfig::startup(), "ensure_crds_installed", || {
        ensure_crds_installed(&client)
    })
    .await?;

    let namespace = config.namespace().map(str::to_string);
    let ns = namespace.as_deref();
    let ctx = Arc::new(Context::new(client.clone(), config.clone()));

    let components: Api<Component> = scoped(&client, ns);
    let mut controller = Controller::new(components, WatcherConfig::default());
    for kind in registry::watched_kinds() {
        tracing::info!(%kind, "Watching owned objects");
        controller = match kind {
            DependentKind::Deployment => {
                controller.owns(scoped::<Deployment>(&client, ns), WatcherConfig::default())
            }
            DependentKind::PersistentVolumeClaim => controller.owns(
                scoped::<PersistentVolumeClaim>(&client, ns),
                WatcherConfig::default(),
            ),
            DependentKind::TaskRun => controller.owns_with(
                scoped_dynamic(&client, ns),
                task_run_resource(),
                WatcherConfig::default(),
            ),
            _ => controller,
        };
    }

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Component reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Component reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Component controller shutting down");
    Ok(())
}
