use k8s_openapi::api::apps::v1::Deployment;
use kube::api::DynamicObject;

/// Hint returned while dependent objects are still materializing.
pub const RESOURCE_WAIT_SECS: u64 = 10;

/// Seconds the caller should wait before the next pass; zero when converged.
pub fn pending_secs(
    mutated: bool,
    deployment: Option<&Deployment>,
    image_stream: Option<&DynamicObject>,
    image_tag: &str,
) -> u64 {
    if mutated || !deployment_available(deployment) {
        return RESOURCE_WAIT_SECS;
    }
    match image_stream {
        Some(is) if !tag_resolved(is, image_tag) => RESOURCE_WAIT_SECS,
        _ => 0,
    }
}

pub fn deployment_available(deployment: Option<&Deployment>) -> bool {
    let Some(dep) = deployment else { return false };
    let desired = dep.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let available = dep
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    available >= desired
}

/// An ImageStream tag is usable once the registry import populated
/// `status.tags[].items`.
pub fn tag_resolved(image_stream: &DynamicObject, tag: &str) -> bool {
    image_stream.data["status"]["tags"]
        .as_array()
        .map(|tags| {
            tags.iter().any(|t| {
                t["tag"].as_str() == Some(tag)
                    && t["items"].as_array().map(|i| !i.is_empty()).unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use kube::api::{ApiResource, GroupVersionKind};
    use serde_json::json;

    fn dep(desired: i32, available: Option<i32>) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(desired),
                ..Default::default()
            }),
            status: available.map(|a| DeploymentStatus {
                available_replicas: Some(a),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn image_stream(status: serde_json::Value) -> DynamicObject {
        let ar = ApiResource::from_gvk(&GroupVersionKind::gvk(
            "image.openshift.io",
            "v1",
            "ImageStream",
        ));
        DynamicObject::new("svc-a", &ar).data(json!({ "status": status }))
    }

    #[test]
    fn converged_when_available_and_untouched() {
        assert_eq!(pending_secs(false, Some(&dep(2, Some(2))), None, "latest"), 0);
    }

    #[test]
    fn waits_after_mutation() {
        assert_eq!(
            pending_secs(true, Some(&dep(1, Some(1))), None, "latest"),
            RESOURCE_WAIT_SECS
        );
    }

    #[test]
    fn waits_for_replicas() {
        assert_eq!(pending_secs(false, Some(&dep(3, Some(1))), None, "latest"), RESOURCE_WAIT_SECS);
        assert_eq!(pending_secs(false, Some(&dep(1, None)), None, "latest"), RESOURCE_WAIT_SECS);
        assert_eq!(pending_secs(false, None, None, "latest"), RESOURCE_WAIT_SECS);
    }

    #[test]
    fn scaled_to_zero_counts_as_available() {
        assert!(deployment_available(Some(&dep(0, None))));
    }

    #[test]
    fn waits_for_image_stream_import() {
        let d = dep(1, Some(1));
        let pending = image_stream(json!({"tags": [{"tag": "latest", "items": []}]}));
        assert_eq!(
            pending_secs(false, Some(&d), Some(&pending), "latest"),
            RESOURCE_WAIT_SECS
        );
        let ready = image_stream(json!({
            "tags": [{"tag": "latest", "items": [{"image": "sha256:1"}]}]
        }));
        assert_eq!(pending_secs(false, Some(&d), Some(&ready), "latest"), 0);
        assert_eq!(
            pending_secs(false, Some(&d), Some(&ready), "1.0"),
            RESOURCE_WAIT_SECS
        );
    }
}
