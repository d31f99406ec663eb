use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;

use super::probe::HealthCheckProbe;
use super::types::ObjectKey;

/// Tag appended to images that don't carry one.
pub const LATEST_TAG: &str = "latest";

/// Drift checks: `true` when the live object already matches the desired one.
#[derive(Clone, Copy)]
pub struct Comparators {
    pub deployment: fn(desired: &Deployment, live: &Deployment) -> bool,
    pub service: fn(desired: &Service, live: &Service) -> bool,
}

/// Instance-bound callbacks the deployer invokes while building and
/// comparing dependent objects.
pub trait DeploymentHooks: Send + Sync {
    fn on_deployment_create(&self, deployment: &mut Deployment);
    fn comparators(&self) -> Comparators;
}

/// How to converge one resource. Built fresh for every pass and dropped
/// once the deployer returns.
#[derive(Clone)]
pub struct ServiceDefinition {
    pub request: ObjectKey,
    pub default_image_tag: &'static str,
    pub single_replica: bool,
    pub hooks: Arc<dyn DeploymentHooks>,
    pub custom_service: bool,
    pub health_check_probe: HealthCheckProbe,
}

impl std::fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("request", &self.request)
            .field("default_image_tag", &self.default_image_tag)
            .field("single_replica", &self.single_replica)
            .field("custom_service", &self.custom_service)
            .field("health_check_probe", &self.health_check_probe)
            .finish_non_exhaustive()
    }
}
