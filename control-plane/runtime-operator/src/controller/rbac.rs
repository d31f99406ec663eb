use async_trait::async_trait;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, Patch, PatchParams};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::OperatorError;

/// Identity every managed workload runs under.
pub const SERVICE_VIEWER: &str = "kogito-service-viewer";

/// Ensures namespace-scoped access control exists before workloads are
/// created. Must be idempotent.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PrerequisiteProvisioner: Send + Sync {
    async fn ensure(&self, namespace: &str) -> Result<(), OperatorError>;
}

pub struct RbacProvisioner {
    client: Client,
    field_manager: String,
}

impl RbacProvisioner {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    async fn apply<K>(&self, api: Api<K>, obj: &K) -> Result<(), OperatorError>
    where
        K: kube::Resource + Clone + Serialize + serde::de::DeserializeOwned + std::fmt::Debug,
    {
        let name = object_name(obj)?;
        let pp = PatchParams::apply(&self.field_manager).force();
        let body = serde_json::to_value(obj)?;
        api.patch(&name, &pp, &Patch::Apply(&body)).await?;
        Ok(())
    }
}

#[async_trait]
impl PrerequisiteProvisioner for RbacProvisioner {
    #[instrument(skip_all, fields(ns = %namespace))]
    async fn ensure(&self, namespace: &str) -> Result<(), OperatorError> {
        self.apply(
            Api::<ServiceAccount>::namespaced(self.client.clone(), namespace),
            &service_account(namespace),
        )
        .await?;
        self.apply(
            Api::<Role>::namespaced(self.client.clone(), namespace),
            &viewer_role(namespace),
        )
        .await?;
        self.apply(
            Api::<RoleBinding>::namespaced(self.client.clone(), namespace),
            &viewer_role_binding(namespace),
        )
        .await?;
        debug!(%namespace, "rbac: service viewer ensured");
        Ok(())
    }
}

fn object_name<K: kube::Resource>(obj: &K) -> Result<String, OperatorError> {
    obj.meta()
        .name
        .clone()
        .ok_or_else(|| OperatorError::Invalid("prerequisite object has no name".into()))
}

fn meta(namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(SERVICE_VIEWER.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

// Server-side apply needs apiVersion/kind in the body; k8s-openapi
// serializes them for typed objects.
pub fn service_account(namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(namespace),
        ..Default::default()
    }
}

pub fn viewer_role(namespace: &str) -> Role {
    Role {
        metadata: meta(namespace),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["".into()]),
            resources: Some(vec!["services".into(), "configmaps".into()]),
            verbs: vec!["get".into(), "list".into(), "watch".into()],
            ..Default::default()
        }]),
    }
}

pub fn viewer_role_binding(namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: meta(namespace),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".into(),
            kind: "Role".into(),
            name: SERVICE_VIEWER.into(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".into(),
            name: SERVICE_VIEWER.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }]),
    }
}
