use std::time::Duration;

use envconfig::Envconfig;

/// Requeue interval used when the env value is zero.
pub const DEFAULT_REQUEUE_SECS: u64 = 30;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Restrict the watch to one namespace; all namespaces when unset.
    /// Env: WATCH_NAMESPACE
    #[envconfig(from = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    #[envconfig(from = "HTTP_PORT", default = "8081")]
    pub http_port: u16,

    /// Field manager used for server-side apply.
    #[envconfig(from = "RTO_FIELD_MANAGER", default = "runtime-operator")]
    pub field_manager: String,

    /// Force the platform instead of discovering it (openshift | kubernetes).
    /// Env: RTO_PLATFORM
    #[envconfig(from = "RTO_PLATFORM")]
    pub platform: Option<String>,

    #[envconfig(nested)]
    pub reconcile: ReconcileConfig,

    #[envconfig(nested)]
    pub images: ImageConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct ReconcileConfig {
    /// Fixed backoff applied whenever convergence is still incomplete.
    #[envconfig(from = "RTO_REQUEUE_SECS", default = "30")]
    pub requeue_secs: u64,
    /// Backoff applied by the error policy after a failed pass.
    #[envconfig(from = "RTO_ERROR_BACKOFF_SECS", default = "5")]
    pub error_backoff_secs: u64,
    /// Server-side watch timeout; must stay below the client read timeout.
    #[envconfig(from = "RTO_WATCH_TIMEOUT_SECS", default = "290")]
    pub watch_timeout_secs: u32,
}

#[derive(Envconfig, Clone, Debug)]
pub struct ImageConfig {
    /// Registry used to resolve images for resources that don't set one.
    #[envconfig(from = "RTO_IMAGE_REGISTRY", default = "quay.io/kiegroup")]
    pub registry: String,
}

impl ReconcileConfig {
    pub fn requeue_interval(&self) -> Duration {
        if self.requeue_secs == 0 {
            Duration::from_secs(DEFAULT_REQUEUE_SECS)
        } else {
            Duration::from_secs(self.requeue_secs)
        }
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs.max(1))
    }
}

impl OperatorConfig {
    /// Platform override parsed from `RTO_PLATFORM`; `None` means discover.
    pub fn openshift_override(&self) -> Option<bool> {
        match self.platform.as_deref()?.to_ascii_lowercase().as_str() {
            "openshift" | "ocp" => Some(true),
            "kubernetes" | "k8s" => Some(false),
            _ => None,
        }
    }
}
