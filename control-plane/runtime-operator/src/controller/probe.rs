use crate::crd::kogito_runtime::RuntimeType;

/// Health-check mechanism wired into the workload's liveness and readiness probes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthCheckProbe {
    /// Plain TCP socket check on the HTTP port.
    Tcp,
    /// HTTP check against the application's own health endpoints.
    Quarkus,
}

/// Per-flavor bindings. Supporting a new flavor means adding a row to
/// `PROFILES`, not a new branch in the reconciler.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeProfile {
    pub runtime: RuntimeType,
    pub probe: HealthCheckProbe,
    pub liveness_path: Option<&'static str>,
    pub readiness_path: Option<&'static str>,
    /// Value of the runtime label put on the Deployment and pods.
    pub label: &'static str,
}

pub const RUNTIME_LABEL: &str = "kogito.kie.org/runtime";

static PROFILES: &[RuntimeProfile] = &[
    RuntimeProfile {
        runtime: RuntimeType::Quarkus,
        probe: HealthCheckProbe::Quarkus,
        liveness_path: Some("/q/health/live"),
        readiness_path: Some("/q/health/ready"),
        label: "quarkus",
    },
    RuntimeProfile {
        runtime: RuntimeType::Springboot,
        probe: HealthCheckProbe::Tcp,
        liveness_path: None,
        readiness_path: None,
        label: "springboot",
    },
];

static FALLBACK: RuntimeProfile = RuntimeProfile {
    runtime: RuntimeType::Unknown,
    probe: HealthCheckProbe::Tcp,
    liveness_path: None,
    readiness_path: None,
    label: "unknown",
};

pub fn profile(runtime: RuntimeType) -> &'static RuntimeProfile {
    PROFILES
        .iter()
        .find(|p| p.runtime == runtime)
        .unwrap_or(&FALLBACK)
}

/// Probe selection is advisory: anything not in the table gets TCP.
pub fn select_probe(runtime: RuntimeType) -> HealthCheckProbe {
    profile(runtime).probe
}
