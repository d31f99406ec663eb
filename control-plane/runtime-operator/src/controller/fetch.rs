use async_trait::async_trait;
use kube::{Api, Client};
#[cfg(test)]
use mockall::automock;
use tracing::trace;

use crate::crd::kogito_runtime::KogitoRuntime;
use crate::error::OperatorError;

/// Loads the authoritative copy of a resource by namespaced identity.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// `Ok(None)` when the object no longer exists.
    async fn fetch(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<KogitoRuntime>, OperatorError>;
}

pub struct KubeFetcher {
    client: Client,
}

impl KubeFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceFetcher for KubeFetcher {
    async fn fetch(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<KogitoRuntime>, OperatorError> {
        let api: Api<KogitoRuntime> =
            Api::namespaced(self.client.clone(), namespace);
        let obj = api.get_opt(name).await?;
        trace!(%namespace, %name, found = obj.is_some(), "fetch: done");
        Ok(obj)
    }
}
