pub mod readiness;
pub mod render;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, instrument, trace};

use crate::controller::definition::ServiceDefinition;
use crate::crd::kogito_runtime::{KogitoRuntime, KogitoRuntimeStatus, RuntimePhase};
use crate::error::OperatorError;

pub const DEPLOYED_MESSAGE: &str = "All resources are available";
pub const PROVISIONING_MESSAGE: &str = "Waiting for dependent resources";

/// Creates or updates the dependent objects of a resource.
///
/// Returns how many seconds the caller should wait before checking again;
/// zero once everything is in place. Calling it again after convergence
/// must not mutate anything.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceDeployer: Send + Sync {
    async fn deploy(
        &self,
        definition: &ServiceDefinition,
        instance: &KogitoRuntime,
    ) -> Result<u64, OperatorError>;
}

/// Cluster reads and writes the deployer performs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeployerKubeClient: Send + Sync {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, OperatorError>;

    async fn apply_deployment(
        &self,
        namespace: &str,
        name: &str,
        obj: &Deployment,
    ) -> Result<Deployment, OperatorError>;

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, OperatorError>;

    async fn apply_service(
        &self,
        namespace: &str,
        name: &str,
        obj: &Service,
    ) -> Result<Service, OperatorError>;

    async fn get_dynamic(
        &self,
        namespace: &str,
        resource: &ApiResource,
        name: &str,
    ) -> Result<Option<DynamicObject>, OperatorError>;

    async fn apply_dynamic(
        &self,
        namespace: &str,
        resource: &ApiResource,
        name: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, OperatorError>;

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &KogitoRuntimeStatus,
    ) -> Result<(), OperatorError>;
}

/// Server-side apply against a live API server.
pub struct KubeDeployerClient {
    client: Client,
    field_manager: String,
}

impl KubeDeployerClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    async fn apply<K>(&self, api: Api<K>, name: &str, obj: &K) -> Result<K, OperatorError>
    where
        K: Clone + Serialize + DeserializeOwned + std::fmt::Debug,
    {
        let pp = PatchParams::apply(&self.field_manager).force();
        let body = serde_json::to_value(obj)?;
        Ok(api.patch(name, &pp, &Patch::Apply(&body)).await?)
    }
}

#[async_trait]
impl DeployerKubeClient for KubeDeployerClient {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, OperatorError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_deployment(
        &self,
        namespace: &str,
        name: &str,
        obj: &Deployment,
    ) -> Result<Deployment, OperatorError> {
        self.apply(Api::namespaced(self.client.clone(), namespace), name, obj)
            .await
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, OperatorError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_service(
        &self,
        namespace: &str,
        name: &str,
        obj: &Service,
    ) -> Result<Service, OperatorError> {
        self.apply(Api::namespaced(self.client.clone(), namespace), name, obj)
            .await
    }

    async fn get_dynamic(
        &self,
        namespace: &str,
        resource: &ApiResource,
        name: &str,
    ) -> Result<Option<DynamicObject>, OperatorError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_dynamic(
        &self,
        namespace: &str,
        resource: &ApiResource,
        name: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, OperatorError> {
        let api = Api::namespaced_with(self.client.clone(), namespace, resource);
        self.apply(api, name, obj).await
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &KogitoRuntimeStatus,
    ) -> Result<(), OperatorError> {
        let api: Api<KogitoRuntime> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": status });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Read, compare with the definition's comparators, apply only on drift.
pub struct ApplyDeployer {
    kube: Arc<dyn DeployerKubeClient>,
    registry: String,
    openshift: bool,
}

fn announce_write(kind: &str, name: &str, exists: bool) {
    if exists {
        info!(%kind, %name, "deploy: drift detected; updating");
    } else {
        info!(%kind, %name, "deploy: creating");
    }
}

impl ApplyDeployer {
    pub fn new(
        client: Client,
        field_manager: impl Into<String>,
        registry: impl Into<String>,
        openshift: bool,
    ) -> Self {
        Self::with_kube(
            Arc::new(KubeDeployerClient::new(client, field_manager)),
            registry,
            openshift,
        )
    }

    pub fn with_kube(
        kube: Arc<dyn DeployerKubeClient>,
        registry: impl Into<String>,
        openshift: bool,
    ) -> Self {
        Self {
            kube,
            registry: registry.into(),
            openshift,
        }
    }

    /// Returns the live object after convergence and whether it was written.
    async fn converge_dynamic(
        &self,
        ns: &str,
        resource: &ApiResource,
        name: &str,
        desired: &DynamicObject,
    ) -> Result<(DynamicObject, bool), OperatorError> {
        match self.kube.get_dynamic(ns, resource, name).await? {
            Some(live) if render::dynamic_spec_matches(desired, &live) => {
                trace!(kind = %resource.kind, %name, "deploy: in sync");
                Ok((live, false))
            }
            live => {
                announce_write(&resource.kind, name, live.is_some());
                let applied = self.kube.apply_dynamic(ns, resource, name, desired).await?;
                Ok((applied, true))
            }
        }
    }

    async fn update_status(
        &self,
        instance: &KogitoRuntime,
        desired: KogitoRuntimeStatus,
    ) -> Result<(), OperatorError> {
        if !status_changed(instance.status.as_ref(), &desired) {
            trace!(name = %instance.name_any(), "deploy: status unchanged; skipping patch");
            return Ok(());
        }
        let ns = instance.namespace().unwrap_or_default();
        self.kube
            .patch_status(&ns, &instance.name_any(), &desired)
            .await
    }
}

#[async_trait]
impl ServiceDeployer for ApplyDeployer {
    #[instrument(
        skip_all,
        fields(
            ns = %definition.request.namespace,
            name = %definition.request.name,
            openshift = self.openshift,
        )
    )]
    async fn deploy(
        &self,
        definition: &ServiceDefinition,
        instance: &KogitoRuntime,
    ) -> Result<u64, OperatorError> {
        let ns = definition.request.namespace.as_str();
        let name = definition.request.name.as_str();
        let image =
            render::resolve_image(instance, &self.registry, definition.default_image_tag);
        let tag = render::image_tag(&image)
            .unwrap_or(definition.default_image_tag)
            .to_string();
        let cmp = definition.hooks.comparators();
        let mut mutated = false;

        let mut image_stream: Option<DynamicObject> = None;
        if self.openshift {
            let desired =
                render::render_image_stream(instance, &image, definition.default_image_tag);
            let (live, changed) = self
                .converge_dynamic(ns, &render::image_stream_resource(), name, &desired)
                .await?;
            mutated |= changed;
            image_stream = Some(live);
        }

        let mut deployment = render::render_deployment(instance, definition, &image);
        definition.hooks.on_deployment_create(&mut deployment);
        let live_dep = match self.kube.get_deployment(ns, name).await? {
            Some(live) if (cmp.deployment)(&deployment, &live) => {
                trace!(kind = "Deployment", %name, "deploy: in sync");
                live
            }
            live => {
                announce_write("Deployment", name, live.is_some());
                mutated = true;
                self.kube.apply_deployment(ns, name, &deployment).await?
            }
        };

        let service = render::render_service(instance);
        match self.kube.get_service(ns, name).await? {
            Some(live) if (cmp.service)(&service, &live) => {
                trace!(kind = "Service", %name, "deploy: in sync");
            }
            live => {
                announce_write("Service", name, live.is_some());
                mutated = true;
                self.kube.apply_service(ns, name, &service).await?;
            }
        }

        if self.openshift {
            let route = render::render_route(instance);
            let (_, changed) = self
                .converge_dynamic(ns, &render::route_resource(), name, &route)
                .await?;
            mutated |= changed;
        }

        let secs =
            readiness::pending_secs(mutated, Some(&live_dep), image_stream.as_ref(), &tag);
        let (phase, message) = if secs == 0 {
            (RuntimePhase::Deployed, DEPLOYED_MESSAGE)
        } else {
            (RuntimePhase::Provisioning, PROVISIONING_MESSAGE)
        };
        self.update_status(
            instance,
            KogitoRuntimeStatus {
                phase: Some(phase),
                message: Some(message.into()),
                image: Some(image),
                observed_generation: instance.meta().generation,
                last_updated: Some(Utc::now().to_rfc3339()),
            },
        )
        .await?;
        debug!(%ns, %name, mutated, secs, "deploy: complete");
        Ok(secs)
    }
}

/// Material status change, ignoring the timestamp.
fn status_changed(current: Option<&KogitoRuntimeStatus>, desired: &KogitoRuntimeStatus) -> bool {
    match current {
        None => true,
        Some(cur) => {
            let strip = |s: &KogitoRuntimeStatus| KogitoRuntimeStatus {
                last_updated: None,
                ..s.clone()
            };
            strip(cur) != strip(desired)
        }
    }
}
