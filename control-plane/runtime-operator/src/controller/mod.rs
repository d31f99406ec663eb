pub mod definition;
pub mod fetch;
pub mod filter;
pub mod handler;
pub mod probe;
pub mod quantity;
pub mod rbac;
pub mod reconcile;
pub mod types;


use std::sync::Arc;
use std::time::Duration;

use futures_util::{StreamExt, TryStreamExt, future};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::DynamicObject;
use kube::runtime::controller::{Action, Error as ControllerError};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, reflector, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::kogito_runtime::KogitoRuntime;
use crate::deployer::{ApplyDeployer, ServiceDeployer, render};
use crate::error::OperatorError;
use fetch::{KubeFetcher, ResourceFetcher};
use rbac::{PrerequisiteProvisioner, RbacProvisioner};
use reconcile::{PassContext, run_pass};
use types::{ObjectKey, PassOutcome};

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("fetching {key} failed: {source}")]
    Fetch {
        key: ObjectKey,
        #[source]
        source: OperatorError,
    },
    #[error("provisioning prerequisites in namespace {namespace} failed: {source}")]
    Provision {
        namespace: String,
        #[source]
        source: OperatorError,
    },
    #[error("converging {key} failed: {source}")]
    Converge {
        key: ObjectKey,
        #[source]
        source: OperatorError,
    },
}

/// Shared, long-lived collaborators. Each pass borrows them through a
/// fresh [`PassContext`].
pub struct ControllerContext {
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub provisioner: Arc<dyn PrerequisiteProvisioner>,
    pub deployer: Arc<dyn ServiceDeployer>,
    pub requeue_interval: Duration,
    pub error_backoff: Duration,
}

impl ControllerContext {
    pub fn from_client(client: Client, cfg: &OperatorConfig, openshift: bool) -> Self {
        Self {
            fetcher: Arc::new(KubeFetcher::new(client.clone())),
            provisioner: Arc::new(RbacProvisioner::new(client.clone(), cfg.field_manager.clone())),
            deployer: Arc::new(ApplyDeployer::new(
                client,
                cfg.field_manager.clone(),
                cfg.images.registry.clone(),
                openshift,
            )),
            requeue_interval: cfg.reconcile.requeue_interval(),
            error_backoff: cfg.reconcile.error_backoff(),
        }
    }

    fn pass(&self, request: ObjectKey) -> PassContext<'_> {
        PassContext {
            request,
            fetcher: self.fetcher.as_ref(),
            provisioner: self.provisioner.as_ref(),
            deployer: self.deployer.as_ref(),
            requeue_interval: self.requeue_interval,
        }
    }
}

fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn scoped_dynamic_api(
    client: Client,
    namespace: Option<&str>,
    ar: &kube::api::ApiResource,
) -> Api<DynamicObject> {
    match namespace {
        Some(ns) => Api::namespaced_with(client, ns, ar),
        None => Api::all_with(client, ar),
    }
}

pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
    openshift: bool,
) -> anyhow::Result<()> {
    let ns = cfg.watch_namespace.as_deref();
    info!(
        scope = ns.unwrap_or("cluster-wide"),
        openshift,
        "Adding watched objects for KogitoRuntime controller"
    );
    let ctx = Arc::new(ControllerContext::from_client(client.clone(), &cfg, openshift));
    let wc = WatcherConfig::default().timeout(cfg.reconcile.watch_timeout_secs);

    // Filter after the reflector so the store still sees deletes.
    let (reader, writer) = reflector::store();
    let runtimes = reflector(
        writer,
        watcher(scoped_api::<KogitoRuntime>(client.clone(), ns), wc.clone()),
    )
    .default_backoff()
    .try_filter(|ev| future::ready(filter::admits(ev)))
    .touched_objects();

    let mut controller = Controller::for_stream(runtimes, reader)
        .owns(scoped_api::<Service>(client.clone(), ns), wc.clone())
        .owns(scoped_api::<Deployment>(client.clone(), ns), wc.clone())
        .owns(scoped_api::<ConfigMap>(client.clone(), ns), wc.clone());
    if openshift {
        let route = render::route_resource();
        let image_stream = render::image_stream_resource();
        controller = controller
            .owns_with(scoped_dynamic_api(client.clone(), ns, &route), route, wc.clone())
            .owns_with(
                scoped_dynamic_api(client.clone(), ns, &image_stream),
                image_stream,
                wc.clone(),
            );
    }

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    debug!(object = %obj_ref, ?action, "reconciled")
                }
                Err(ControllerError::ObjectNotFound(obj_ref)) => {
                    debug!(object = %obj_ref, "object gone before reconcile")
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

pub async fn reconcile(
    obj: Arc<KogitoRuntime>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    // Level-triggered: only the identity of the trigger matters.
    let request = ObjectKey::new(
        obj.namespace().unwrap_or_else(|| "default".to_string()),
        obj.name_any(),
    );
    let outcome = run_pass(&ctx.pass(request)).await?;
    Ok(into_action(outcome))
}

pub fn into_action(outcome: PassOutcome) -> Action {
    match outcome {
        PassOutcome::Done => Action::await_change(),
        PassOutcome::Requeued(after) => Action::requeue(after),
    }
}

fn error_policy(
    obj: Arc<KogitoRuntime>,
    err: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    warn!(
        ns = %obj.namespace().unwrap_or_default(),
        name = %obj.name_any(),
        error = %err,
        backoff_secs = ctx.error_backoff.as_secs(),
        "reconcile failed; retrying"
    );
    Action::requeue(ctx.error_backoff)
}
