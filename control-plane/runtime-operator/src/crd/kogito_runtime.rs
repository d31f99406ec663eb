use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "rhpam.kiegroup.org",
    version = "v1",
    kind = "KogitoRuntime",
    plural = "kogitoruntimes",
    shortname = "kruntime",
    namespaced,
    status = "KogitoRuntimeStatus",
    printcolumn = r#"{"name":"Runtime","type":"string","jsonPath":".spec.runtime"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KogitoRuntimeSpec {
    /// Runtime flavor of the service image; drives health probing.
    #[serde(default)]
    pub runtime: RuntimeType,
    /// Full image reference. Resolved from the operator registry and the
    /// resource name when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Extra labels added to the Deployment and its pods.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deployment_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub service_labels: BTreeMap<String, String>,
    /// ConfigMap holding `application.properties`, mounted into the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties_config_map: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    #[default]
    Quarkus,
    Springboot,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeType::Quarkus => write!(f, "quarkus"),
            RuntimeType::Springboot => write!(f, "springboot"),
            RuntimeType::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KogitoRuntimeStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<RuntimePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Image the Deployment currently runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum RuntimePhase {
    Provisioning,
    Deployed,
}

impl KogitoRuntime {
    pub fn replicas(&self) -> i32 {
        self.spec.replicas.unwrap_or(1).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn unknown_runtime_deserializes_to_fallback() {
        let spec: KogitoRuntimeSpec =
            serde_json::from_value(serde_json::json!({"runtime": "micronaut"}))
                .unwrap();
        assert_eq!(spec.runtime, RuntimeType::Unknown);
    }

    #[test]
    fn runtime_defaults_to_quarkus() {
        let spec: KogitoRuntimeSpec =
            serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(spec.runtime, RuntimeType::Quarkus);
        assert!(spec.env.is_empty());

        let spec: KogitoRuntimeSpec =
            serde_json::from_value(serde_json::json!({"runtime": "springboot"}))
                .unwrap();
        assert_eq!(spec.runtime, RuntimeType::Springboot);
    }

    #[test]
    fn replicas_default_and_clamp() {
        let mut kr = KogitoRuntime::new("svc-a", KogitoRuntimeSpec::default());
        assert_eq!(kr.replicas(), 1);
        kr.spec.replicas = Some(3);
        assert_eq!(kr.replicas(), 3);
        kr.spec.replicas = Some(-2);
        assert_eq!(kr.replicas(), 0);
    }

    #[test]
    fn crd_carries_group_and_status() {
        let crd = KogitoRuntime::crd();
        assert_eq!(crd.spec.group, "rhpam.kiegroup.org");
        assert_eq!(crd.spec.names.plural, "kogitoruntimes");
        let v = &crd.spec.versions[0];
        assert!(v.subresources.as_ref().and_then(|s| s.status.as_ref()).is_some());
    }
}
