use kube::Client;
use kube::discovery::Discovery;
use tracing::{info, warn};

pub const ROUTE_GROUP: &str = "route.openshift.io";

/// Whether the cluster serves OpenShift routes. An explicit override wins;
/// a failed discovery counts as plain Kubernetes.
pub async fn is_openshift(client: &Client, override_: Option<bool>) -> bool {
    if let Some(v) = override_ {
        info!(openshift = v, "platform: using configured override");
        return v;
    }
    match Discovery::new(client.clone())
        .filter(&[ROUTE_GROUP])
        .run()
        .await
    {
        Ok(discovery) => {
            let found = discovery.groups().any(|g| g.name() == ROUTE_GROUP);
            info!(openshift = found, "platform: discovered");
            found
        }
        Err(e) => {
            warn!(error = %e, "platform: discovery failed; assuming kubernetes");
            false
        }
    }
}
