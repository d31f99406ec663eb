use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, Probe,
    ResourceRequirements, Service, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::definition::{Comparators, DeploymentHooks};
use super::quantity::same_quantity;
use crate::crd::kogito_runtime::KogitoRuntime;

pub const PROPERTIES_VOLUME: &str = "app-properties";
pub const PROPERTIES_MOUNT_PATH: &str = "/home/kogito/config";

/// Binds user overrides from one `KogitoRuntime` into the deployer callbacks.
pub struct RuntimeDeploymentHandler {
    instance: Arc<KogitoRuntime>,
}

impl RuntimeDeploymentHandler {
    pub fn new(instance: Arc<KogitoRuntime>) -> Self {
        Self { instance }
    }
}

impl DeploymentHooks for RuntimeDeploymentHandler {
    fn on_deployment_create(&self, deployment: &mut Deployment) {
        let spec = &self.instance.spec;

        if !spec.deployment_labels.is_empty() {
            merge_labels(&mut deployment.metadata.labels, &spec.deployment_labels);
            if let Some(tpl) = deployment
                .spec
                .as_mut()
                .and_then(|s| s.template.metadata.as_mut())
            {
                merge_labels(&mut tpl.labels, &spec.deployment_labels);
            }
        }

        let Some(pod) = deployment.spec.as_mut().and_then(|s| s.template.spec.as_mut())
        else {
            return;
        };

        if let Some(cm) = spec.properties_config_map.as_ref() {
            pod.volumes.get_or_insert_with(Vec::new).push(Volume {
                name: PROPERTIES_VOLUME.into(),
                config_map: Some(ConfigMapVolumeSource {
                    name: cm.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        if let Some(c) = pod.containers.first_mut() {
            if !spec.env.is_empty() {
                let env = c.env.get_or_insert_with(Vec::new);
                for var in &spec.env {
                    // user values win over defaults with the same name
                    env.retain(|e| e.name != var.name);
                    env.push(var.clone());
                }
            }
            if spec.resources.is_some() {
                c.resources = spec.resources.clone();
            }
            if spec.properties_config_map.is_some() {
                c.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
                    name: PROPERTIES_VOLUME.into(),
                    mount_path: PROPERTIES_MOUNT_PATH.into(),
                    read_only: Some(true),
                    ..Default::default()
                });
            }
        }
    }

    fn comparators(&self) -> Comparators {
        Comparators {
            deployment: deployment_matches,
            service: service_matches,
        }
    }
}

fn merge_labels(
    target: &mut Option<BTreeMap<String, String>>,
    extra: &BTreeMap<String, String>,
) {
    let labels = target.get_or_insert_with(BTreeMap::new);
    for (k, v) in extra {
        labels.insert(k.clone(), v.clone());
    }
}

fn labels_subset(
    desired: Option<&BTreeMap<String, String>>,
    live: Option<&BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else { return true };
    let empty = BTreeMap::new();
    let live = live.unwrap_or(&empty);
    desired.iter().all(|(k, v)| live.get(k) == Some(v))
}

fn probe_kind(p: Option<&Probe>) -> Option<String> {
    let p = p?;
    if let Some(http) = p.http_get.as_ref() {
        return Some(format!("http:{}", http.path.as_deref().unwrap_or("/")));
    }
    p.tcp_socket.as_ref().map(|_| "tcp".to_string())
}

/// Every quantity the desired map names is present with the same value.
/// Keys the server adds (requests defaulted from limits) are ignored.
fn quantities_cover(
    desired: Option<&BTreeMap<String, Quantity>>,
    live: Option<&BTreeMap<String, Quantity>>,
) -> bool {
    let Some(desired) = desired else { return true };
    desired.iter().all(|(k, want)| {
        live.and_then(|l| l.get(k))
            .is_some_and(|got| same_quantity(want, got))
    })
}

fn resources_match(
    desired: Option<&ResourceRequirements>,
    live: Option<&ResourceRequirements>,
) -> bool {
    let Some(desired) = desired else { return true };
    quantities_cover(
        desired.limits.as_ref(),
        live.and_then(|l| l.limits.as_ref()),
    ) && quantities_cover(
        desired.requests.as_ref(),
        live.and_then(|l| l.requests.as_ref()),
    ) && (desired.claims.is_none()
        || desired.claims == live.and_then(|l| l.claims.clone()))
}

fn env_source_matches(
    desired: Option<&EnvVarSource>,
    live: Option<&EnvVarSource>,
) -> bool {
    let (d, l) = match (desired, live) {
        (None, None) => return true,
        (Some(d), Some(l)) => (d, l),
        _ => return false,
    };
    let field_ref = match (d.field_ref.as_ref(), l.field_ref.as_ref()) {
        (None, None) => true,
        (Some(d), Some(l)) => {
            // apiVersion is defaulted to v1 by the server
            d.field_path == l.field_path
                && d.api_version.as_deref().unwrap_or("v1")
                    == l.api_version.as_deref().unwrap_or("v1")
        }
        _ => false,
    };
    let resource_ref = match (
        d.resource_field_ref.as_ref(),
        l.resource_field_ref.as_ref(),
    ) {
        (None, None) => true,
        (Some(d), Some(l)) => {
            d.resource == l.resource
                && d.container_name.as_deref().unwrap_or_default()
                    == l.container_name.as_deref().unwrap_or_default()
                && match (d.divisor.as_ref(), l.divisor.as_ref()) {
                    (None, _) => true,
                    (Some(want), Some(got)) => same_quantity(want, got),
                    (Some(_), None) => false,
                }
        }
        _ => false,
    };
    field_ref
        && resource_ref
        && d.config_map_key_ref == l.config_map_key_ref
        && d.secret_key_ref == l.secret_key_ref
}

/// Same variable names, and each value or source agrees once server
/// defaults are accounted for. Empty values are omitted on read.
fn env_matches(desired: &[EnvVar], live: &[EnvVar]) -> bool {
    desired.len() == live.len()
        && desired.iter().all(|d| {
            live.iter().find(|l| l.name == d.name).is_some_and(|l| {
                d.value.as_deref().unwrap_or_default()
                    == l.value.as_deref().unwrap_or_default()
                    && env_source_matches(d.value_from.as_ref(), l.value_from.as_ref())
            })
        })
}

fn container_matches(desired: &Container, live: &Container) -> bool {
    let ports = |c: &Container| {
        c.ports
            .as_ref()
            .map(|ps| ps.iter().map(|p| p.container_port).collect::<Vec<_>>())
            .unwrap_or_default()
    };
    let mounts = |c: &Container| {
        c.volume_mounts
            .as_ref()
            .map(|ms| ms.iter().map(|m| m.name.clone()).collect::<Vec<_>>())
            .unwrap_or_default()
    };
    desired.image == live.image
        && env_matches(
            desired.env.as_deref().unwrap_or_default(),
            live.env.as_deref().unwrap_or_default(),
        )
        && ports(desired) == ports(live)
        && mounts(desired) == mounts(live)
        && resources_match(desired.resources.as_ref(), live.resources.as_ref())
        && probe_kind(desired.liveness_probe.as_ref())
            == probe_kind(live.liveness_probe.as_ref())
        && probe_kind(desired.readiness_probe.as_ref())
            == probe_kind(live.readiness_probe.as_ref())
}

pub fn deployment_matches(desired: &Deployment, live: &Deployment) -> bool {
    if !labels_subset(desired.metadata.labels.as_ref(), live.metadata.labels.as_ref()) {
        return false;
    }
    let (Some(ds), Some(ls)) = (desired.spec.as_ref(), live.spec.as_ref()) else {
        return desired.spec.is_none();
    };
    if ds.replicas != ls.replicas {
        return false;
    }
    let (Some(dp), Some(lp)) = (ds.template.spec.as_ref(), ls.template.spec.as_ref())
    else {
        return ds.template.spec.is_none();
    };
    if dp.service_account_name != lp.service_account_name {
        return false;
    }
    let vols = |v: &Option<Vec<Volume>>| {
        v.as_ref()
            .map(|vs| vs.iter().map(|v| v.name.clone()).collect::<Vec<_>>())
            .unwrap_or_default()
    };
    if vols(&dp.volumes) != vols(&lp.volumes) {
        return false;
    }
    dp.containers.len() == lp.containers.len()
        && dp
            .containers
            .iter()
            .zip(lp.containers.iter())
            .all(|(d, l)| container_matches(d, l))
}

pub fn service_matches(desired: &Service, live: &Service) -> bool {
    if !labels_subset(desired.metadata.labels.as_ref(), live.metadata.labels.as_ref()) {
        return false;
    }
    let (Some(ds), Some(ls)) = (desired.spec.as_ref(), live.spec.as_ref()) else {
        return desired.spec.is_none();
    };
    let ports = |s: &k8s_openapi::api::core::v1::ServiceSpec| {
        s.ports
            .as_ref()
            .map(|ps| {
                ps.iter()
                    .map(|p| (p.name.clone(), p.port, p.target_port.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    };
    ds.selector == ls.selector && ports(ds) == ports(ls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::kogito_runtime::KogitoRuntimeSpec;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{ObjectFieldSelector, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn base_deployment() -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("svc-a".into()),
                labels: Some(BTreeMap::from([("app".into(), "svc-a".into())])),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(BTreeMap::from([("app".into(), "svc-a".into())])),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "svc-a".into(),
                            image: Some("quay.io/kiegroup/svc-a:latest".into()),
                            env: Some(vec![EnvVar {
                                name: "HTTP_PORT".into(),
                                value: Some("8080".into()),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn handler(spec: KogitoRuntimeSpec) -> RuntimeDeploymentHandler {
        RuntimeDeploymentHandler::new(Arc::new(KogitoRuntime::new("svc-a", spec)))
    }

    #[test]
    fn user_env_overrides_defaults() {
        let h = handler(KogitoRuntimeSpec {
            env: vec![
                EnvVar {
                    name: "HTTP_PORT".into(),
                    value: Some("9090".into()),
                    ..Default::default()
                },
                EnvVar {
                    name: "DEBUG".into(),
                    value: Some("true".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        let mut dep = base_deployment();
        h.on_deployment_create(&mut dep);
        let env = dep.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();
        assert_eq!(env.len(), 2);
        let port = env.iter().find(|e| e.name == "HTTP_PORT").unwrap();
        assert_eq!(port.value.as_deref(), Some("9090"));
    }

    #[test]
    fn properties_config_map_is_mounted() {
        let h = handler(KogitoRuntimeSpec {
            properties_config_map: Some("svc-a-props".into()),
            ..Default::default()
        });
        let mut dep = base_deployment();
        h.on_deployment_create(&mut dep);
        let pod = dep.spec.unwrap().template.spec.unwrap();
        let vol = &pod.volumes.unwrap()[0];
        assert_eq!(vol.config_map.as_ref().unwrap().name, "svc-a-props");
        let mount = &pod.containers[0].volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.mount_path, PROPERTIES_MOUNT_PATH);
    }

    #[test]
    fn deployment_labels_reach_pods() {
        let h = handler(KogitoRuntimeSpec {
            deployment_labels: BTreeMap::from([("team".into(), "bpm".into())]),
            ..Default::default()
        });
        let mut dep = base_deployment();
        h.on_deployment_create(&mut dep);
        assert_eq!(dep.metadata.labels.as_ref().unwrap()["team"], "bpm");
        let tpl_labels = dep.spec.unwrap().template.metadata.unwrap().labels.unwrap();
        assert_eq!(tpl_labels["team"], "bpm");
        assert_eq!(tpl_labels["app"], "svc-a");
    }

    #[test]
    fn deployment_comparator_detects_drift() {
        let desired = base_deployment();
        let mut live = base_deployment();
        // server-added labels don't count as drift
        live.metadata
            .labels
            .as_mut()
            .unwrap()
            .insert("pod-template-hash".into(), "abc".into());
        assert!(deployment_matches(&desired, &live));

        live.spec.as_mut().unwrap().replicas = Some(3);
        assert!(!deployment_matches(&desired, &live));

        let mut live = base_deployment();
        live.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers[0].image =
            Some("quay.io/kiegroup/svc-a:1.2".into());
        assert!(!deployment_matches(&desired, &live));
    }

    #[test]
    fn comparators_come_from_handler() {
        let h = handler(KogitoRuntimeSpec::default());
        let cmp = h.comparators();
        let d = base_deployment();
        assert!((cmp.deployment)(&d, &d));
        let s = Service::default();
        assert!((cmp.service)(&s, &s));
    }

    fn with_container(mut dep: Deployment, edit: impl FnOnce(&mut Container)) -> Deployment {
        let c = &mut dep.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers[0];
        edit(c);
        dep
    }

    fn cpu_limit(cpu: &str) -> ResourceRequirements {
        ResourceRequirements {
            limits: Some(BTreeMap::from([("cpu".into(), Quantity(cpu.into()))])),
            ..Default::default()
        }
    }

    #[test]
    fn normalised_quantities_are_not_drift() {
        for (mine, server) in [("0.5", "500m"), ("1000m", "1"), ("1Gi", "1024Mi")] {
            let desired = with_container(base_deployment(), |c| {
                c.resources = Some(cpu_limit(mine))
            });
            let live = with_container(base_deployment(), |c| {
                // requests are defaulted from limits on admission
                let mut r = cpu_limit(server);
                r.requests = r.limits.clone();
                c.resources = Some(r);
            });
            assert!(deployment_matches(&desired, &live), "{mine} vs {server}");
        }

        let desired = with_container(base_deployment(), |c| {
            c.resources = Some(cpu_limit("0.5"))
        });
        let live = with_container(base_deployment(), |c| {
            c.resources = Some(cpu_limit("750m"))
        });
        assert!(!deployment_matches(&desired, &live));
    }

    #[test]
    fn defaulted_field_ref_api_version_is_not_drift() {
        let pod_ip = |api_version: Option<&str>| EnvVar {
            name: "POD_IP".into(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    api_version: api_version.map(String::from),
                    field_path: "status.podIP".into(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let desired = with_container(base_deployment(), |c| {
            c.env.as_mut().unwrap().push(pod_ip(None))
        });
        let live = with_container(base_deployment(), |c| {
            c.env.as_mut().unwrap().push(pod_ip(Some("v1")))
        });
        assert!(deployment_matches(&desired, &live));

        let live = with_container(base_deployment(), |c| {
            let mut var = pod_ip(Some("v1"));
            if let Some(src) = var.value_from.as_mut() {
                src.field_ref.as_mut().unwrap().field_path = "status.hostIP".into();
            }
            c.env.as_mut().unwrap().push(var);
        });
        assert!(!deployment_matches(&desired, &live));
    }

    #[test]
    fn empty_env_value_reads_back_as_absent() {
        let desired = with_container(base_deployment(), |c| {
            c.env.as_mut().unwrap()[0].value = Some(String::new())
        });
        let live = with_container(base_deployment(), |c| {
            c.env.as_mut().unwrap()[0].value = None
        });
        assert!(deployment_matches(&desired, &live));
    }

    #[test]
    fn removed_env_var_is_drift() {
        let desired = base_deployment();
        let live = with_container(base_deployment(), |c| c.env = None);
        assert!(!deployment_matches(&desired, &live));
    }
}
