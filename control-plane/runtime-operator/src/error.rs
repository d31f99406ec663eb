/// Failure reported by one of the reconcile collaborators (fetcher,
/// provisioner or deployer).
#[derive(thiserror::Error, Debug)]
pub enum OperatorError {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid resource: {0}")]
    Invalid(String),
}
