use std::net::SocketAddr;

use kube::Client;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{config::OperatorConfig, controller::run_controller, platform, web::run_http_server};

/// Compute the HTTP bind address based on config.
pub fn compute_http_addr(cfg: &OperatorConfig) -> SocketAddr {
    ([0, 0, 0, 0], cfg.http_port).into()
}

/// Spawn the Kubernetes controller loop.
pub fn spawn_controller(
    client: Client,
    cfg: OperatorConfig,
    openshift: bool,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_controller(client, cfg, openshift).await })
}

/// Spawn the health endpoint server.
pub fn spawn_http(addr: SocketAddr) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_http_server(addr).await })
}

/// Start the controller and the health server. Returns when the controller
/// stops (signal) or either task fails.
pub async fn run_all(client: Client, cfg: OperatorConfig) -> anyhow::Result<()> {
    let openshift = platform::is_openshift(&client, cfg.openshift_override()).await;
    let http = spawn_http(compute_http_addr(&cfg));
    let controller = spawn_controller(client, cfg, openshift);

    tokio::select! {
        res = controller => {
            res??;
            info!("controller stopped");
        }
        res = http => {
            res??;
        }
    }
    Ok(())
}
