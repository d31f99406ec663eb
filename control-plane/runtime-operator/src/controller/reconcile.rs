use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use super::ReconcileErr;
use super::definition::{LATEST_TAG, ServiceDefinition};
use super::fetch::ResourceFetcher;
use super::handler::RuntimeDeploymentHandler;
use super::probe::select_probe;
use super::rbac::PrerequisiteProvisioner;
use super::types::{ObjectKey, PassOutcome};
use crate::deployer::ServiceDeployer;

/// Everything one reconcile pass needs. Built per pass from the shared
/// controller context so the pass itself holds no ambient state.
pub struct PassContext<'a> {
    pub request: ObjectKey,
    pub fetcher: &'a dyn ResourceFetcher,
    pub provisioner: &'a dyn PrerequisiteProvisioner,
    pub deployer: &'a dyn ServiceDeployer,
    /// Backoff used whenever the deployer reports incomplete convergence.
    pub requeue_interval: Duration,
}

/// Run one pass: fetch, provision prerequisites, converge, decide.
///
/// The deployer's wait hint is coarsened to `requeue_interval`; only
/// whether it is non-zero matters.
#[instrument(skip_all, fields(ns = %ctx.request.namespace, name = %ctx.request.name))]
pub async fn run_pass(ctx: &PassContext<'_>) -> Result<PassOutcome, ReconcileErr> {
    let ObjectKey { namespace, name } = &ctx.request;
    info!(%namespace, %name, "Reconciling for KogitoRuntime");

    let instance = match ctx.fetcher.fetch(namespace, name).await {
        Ok(Some(obj)) => Arc::new(obj),
        Ok(None) => {
            debug!(%namespace, %name, "KogitoRuntime instance not found");
            return Ok(PassOutcome::Done);
        }
        Err(source) => {
            return Err(ReconcileErr::Fetch {
                key: ctx.request.clone(),
                source,
            });
        }
    };

    ctx.provisioner
        .ensure(namespace)
        .await
        .map_err(|source| ReconcileErr::Provision {
            namespace: namespace.clone(),
            source,
        })?;

    let definition = ServiceDefinition {
        request: ctx.request.clone(),
        default_image_tag: LATEST_TAG,
        single_replica: false,
        hooks: Arc::new(RuntimeDeploymentHandler::new(instance.clone())),
        custom_service: true,
        health_check_probe: select_probe(instance.spec.runtime),
    };
    debug!(
        %namespace,
        %name,
        probe = ?definition.health_check_probe,
        runtime = %instance.spec.runtime,
        "service definition ready"
    );

    let wait_secs = ctx
        .deployer
        .deploy(&definition, &instance)
        .await
        .map_err(|source| ReconcileErr::Converge {
            key: ctx.request.clone(),
            source,
        })?;

    Ok(decide(wait_secs, ctx.requeue_interval, &ctx.request))
}

fn decide(wait_secs: u64, interval: Duration, request: &ObjectKey) -> PassOutcome {
    if wait_secs == 0 {
        return PassOutcome::Done;
    }
    info!(
        ns = %request.namespace,
        name = %request.name,
        reported_secs = wait_secs,
        requeue_secs = interval.as_secs(),
        "Waiting for all resources to be created, scheduling for {} seconds from now",
        interval.as_secs()
    );
    PassOutcome::Requeued(interval)
}
