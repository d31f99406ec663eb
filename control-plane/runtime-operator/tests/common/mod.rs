#![allow(dead_code)]

use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::{Client, api::Api};
use runtime_operator::config::{ImageConfig, OperatorConfig, ReconcileConfig};
use runtime_operator::controller::rbac::SERVICE_VIEWER;
use runtime_operator::crd::kogito_runtime::KogitoRuntime;
use tokio::task::JoinHandle;

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

pub fn test_config(ns: &str) -> OperatorConfig {
    OperatorConfig {
        watch_namespace: Some(ns.to_string()),
        http_port: 0,
        field_manager: "runtime-operator-it".into(),
        platform: Some("kubernetes".into()),
        reconcile: ReconcileConfig {
            requeue_secs: 30,
            error_backoff_secs: 2,
            watch_timeout_secs: 60,
        },
        images: ImageConfig {
            registry: "quay.io/kiegroup".into(),
        },
    }
}

pub async fn wait_for<K, F>(api: &Api<K>, name: &str, secs: u64, cond: F) -> Option<K>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
    F: Fn(&K) -> bool,
{
    for _ in 0..secs {
        if let Ok(Some(obj)) = api.get_opt(name).await {
            if cond(&obj) {
                return Some(obj);
            }
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    None
}

pub async fn cleanup_k8s(ns: &str, name: &str, client: Client) {
    let kr_api: Api<KogitoRuntime> = Api::namespaced(client.clone(), ns);
    let dep_api: Api<Deployment> = Api::namespaced(client.clone(), ns);
    let svc_api: Api<Service> = Api::namespaced(client.clone(), ns);
    let _ = dep_api.delete(name, &Default::default()).await;
    let _ = svc_api.delete(name, &Default::default()).await;
    let _ = kr_api.delete(name, &Default::default()).await;

    // namespace-scoped prerequisites
    let rb_api: Api<RoleBinding> = Api::namespaced(client.clone(), ns);
    let role_api: Api<Role> = Api::namespaced(client.clone(), ns);
    let sa_api: Api<ServiceAccount> = Api::namespaced(client, ns);
    let _ = rb_api.delete(SERVICE_VIEWER, &Default::default()).await;
    let _ = role_api.delete(SERVICE_VIEWER, &Default::default()).await;
    let _ = sa_api.delete(SERVICE_VIEWER, &Default::default()).await;
}

// RAII guard to ensure controller abort + cleanup
pub struct ControllerGuard {
    ns: String,
    name: String,
    client: Client,
    ctrl: Option<JoinHandle<()>>,
}

impl ControllerGuard {
    pub fn new(ns: &str, name: &str, client: Client) -> Self {
        Self {
            ns: ns.to_string(),
            name: name.to_string(),
            client,
            ctrl: None,
        }
    }
    pub fn with_controller(mut self, ctrl: JoinHandle<()>) -> Self {
        self.ctrl = Some(ctrl);
        self
    }
}

impl Drop for ControllerGuard {
    fn drop(&mut self) {
        if let Some(ref handle) = self.ctrl {
            handle.abort();
        }
        let ns = self.ns.clone();
        let name = self.name.clone();
        let client = self.client.clone();
        let _ = tokio::spawn(async move {
            cleanup_k8s(&ns, &name, client).await;
        });
    }
}
