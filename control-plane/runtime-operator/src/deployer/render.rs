use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec, Probe,
    Service, ServicePort, ServiceSpec, TCPSocketAction,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta, OwnerReference,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Resource, ResourceExt};
use serde_json::json;

use crate::controller::definition::ServiceDefinition;
use crate::controller::probe::{self, HealthCheckProbe, RUNTIME_LABEL};
use crate::controller::rbac::SERVICE_VIEWER;
use crate::crd::kogito_runtime::KogitoRuntime;

pub const HTTP_PORT: i32 = 8080;
pub const SERVICE_PORT: i32 = 80;
pub const APP_LABEL: &str = "app";
pub const IMAGE_TRIGGER_ANNOTATION: &str = "image.openshift.io/triggers";

pub fn route_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("route.openshift.io", "v1", "Route"))
}

pub fn image_stream_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "image.openshift.io",
        "v1",
        "ImageStream",
    ))
}

/// Resolve the image a resource should run. An explicit image without a tag
/// or digest gets `default_tag`.
pub fn resolve_image(instance: &KogitoRuntime, registry: &str, default_tag: &str) -> String {
    match instance.spec.image.as_deref().map(str::trim) {
        Some(img) if !img.is_empty() => {
            let last = img.rsplit('/').next().unwrap_or(img);
            if last.contains(':') || img.contains('@') {
                img.to_string()
            } else {
                format!("{img}:{default_tag}")
            }
        }
        _ => format!(
            "{}/{}:{}",
            registry.trim_end_matches('/'),
            instance.name_any(),
            default_tag
        ),
    }
}

/// Split `repo:tag` into its parts; digests keep the whole reference as repo.
pub fn image_tag(image: &str) -> Option<&str> {
    if image.contains('@') {
        return None;
    }
    let last = image.rsplit('/').next()?;
    last.split_once(':').map(|(_, t)| t)
}

fn owner_reference(instance: &KogitoRuntime) -> Option<OwnerReference> {
    instance.controller_owner_ref(&())
}

fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), name.to_string())])
}

fn probe_for(kind: HealthCheckProbe, path: Option<&str>, initial_delay: i32) -> Probe {
    let mut probe = Probe {
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(10),
        failure_threshold: Some(3),
        timeout_seconds: Some(1),
        ..Default::default()
    };
    match (kind, path) {
        (HealthCheckProbe::Quarkus, Some(p)) => {
            probe.http_get = Some(HTTPGetAction {
                path: Some(p.to_string()),
                port: IntOrString::Int(HTTP_PORT),
                scheme: Some("HTTP".into()),
                ..Default::default()
            });
        }
        _ => {
            probe.tcp_socket = Some(TCPSocketAction {
                port: IntOrString::Int(HTTP_PORT),
                ..Default::default()
            });
        }
    }
    probe
}

/// Base Deployment before the definition's creation hook runs.
pub fn render_deployment(
    instance: &KogitoRuntime,
    def: &ServiceDefinition,
    image: &str,
) -> Deployment {
    let name = instance.name_any();
    let prof = probe::profile(instance.spec.runtime);
    let mut labels = selector_labels(&name);
    labels.insert(RUNTIME_LABEL.into(), prof.label.into());
    let replicas = if def.single_replica {
        instance.replicas().min(1)
    } else {
        instance.replicas()
    };

    let container = Container {
        name: name.clone(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".into()),
        ports: Some(vec![ContainerPort {
            name: Some("http".into()),
            container_port: HTTP_PORT,
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        liveness_probe: Some(probe_for(def.health_check_probe, prof.liveness_path, 15)),
        readiness_probe: Some(probe_for(def.health_check_probe, prof.readiness_path, 5)),
        ..Default::default()
    };

    let annotations = if def.custom_service {
        None
    } else {
        let tag = image_tag(image).unwrap_or(def.default_image_tag);
        let trigger = json!([{
            "from": {"kind": "ImageStreamTag", "name": format!("{name}:{tag}")},
            "fieldPath": format!("spec.template.spec.containers[?(@.name==\"{name}\")].image"),
        }]);
        Some(BTreeMap::from([(
            IMAGE_TRIGGER_ANNOTATION.to_string(),
            trigger.to_string(),
        )]))
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: instance.namespace(),
            labels: Some(labels.clone()),
            annotations,
            owner_references: owner_reference(instance).map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(SERVICE_VIEWER.into()),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn render_service(instance: &KogitoRuntime) -> Service {
    let name = instance.name_any();
    let mut labels = selector_labels(&name);
    for (k, v) in &instance.spec.service_labels {
        labels.insert(k.clone(), v.clone());
    }
    Service {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: instance.namespace(),
            labels: Some(labels),
            owner_references: owner_reference(instance).map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(&name)),
            ports: Some(vec![ServicePort {
                name: Some("http".into()),
                port: SERVICE_PORT,
                target_port: Some(IntOrString::Int(HTTP_PORT)),
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn dynamic(ar: &ApiResource, instance: &KogitoRuntime, spec: serde_json::Value) -> DynamicObject {
    let name = instance.name_any();
    let mut obj = DynamicObject::new(&name, ar).data(json!({ "spec": spec }));
    obj.metadata.namespace = instance.namespace();
    obj.metadata.labels = Some(selector_labels(&name));
    obj.metadata.owner_references = owner_reference(instance).map(|o| vec![o]);
    obj
}

pub fn render_route(instance: &KogitoRuntime) -> DynamicObject {
    dynamic(
        &route_resource(),
        instance,
        json!({
            "to": {"kind": "Service", "name": instance.name_any()},
            "port": {"targetPort": "http"},
        }),
    )
}

pub fn render_image_stream(
    instance: &KogitoRuntime,
    image: &str,
    default_tag: &str,
) -> DynamicObject {
    let tag = image_tag(image).unwrap_or(default_tag);
    dynamic(
        &image_stream_resource(),
        instance,
        json!({
            "lookupPolicy": {"local": true},
            "tags": [{
                "name": tag,
                "from": {"kind": "DockerImage", "name": image},
                "importPolicy": {"scheduled": true},
                "referencePolicy": {"type": "Local"},
            }],
        }),
    )
}

/// The route/image-stream comparison only looks at `spec`.
pub fn dynamic_spec_matches(desired: &DynamicObject, live: &DynamicObject) -> bool {
    fn contains(want: &serde_json::Value, have: &serde_json::Value) -> bool {
        match (want, have) {
            (serde_json::Value::Object(w), serde_json::Value::Object(h)) => w
                .iter()
                .all(|(k, v)| h.get(k).map(|hv| contains(v, hv)).unwrap_or(false)),
            (serde_json::Value::Array(w), serde_json::Value::Array(h)) => {
                w.len() == h.len() && w.iter().zip(h).all(|(a, b)| contains(a, b))
            }
            _ => want == have,
        }
    }
    contains(&desired.data["spec"], &live.data["spec"])
}
