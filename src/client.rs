use std::fmt::Debug;

use async_trait::async_trait;
use kube::{
    Client, Resource,
    api::{Api, DeleteParams, PostParams},
    core::NamespaceResourceScope,
    error::ErrorResponse,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, ErrorKind, Result, key::ObjectKey};

pub static USER_MANAGER_NAME: &str = "user-controller";

/// Typed read/write access to namespaced objects of kind `K`, addressed by key.
///
/// Errors are returned as [`Error::KubeError`] so callers can branch on
/// [`Error::kind`], in particular on [`ErrorKind::NotFound`].
#[async_trait]
pub trait TypedClient<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<K>;
    async fn create(&self, obj: &K) -> Result<K>;
    /// Full replace; a `resourceVersion` on `obj` makes the write conditional
    async fn replace(&self, obj: &K) -> Result<K>;
    async fn delete(&self, key: &ObjectKey) -> Result<()>;
}

/// [`TypedClient`] backed by the API server
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    field_manager: String,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: USER_MANAGER_NAME.to_string(),
        }
    }

    fn api<K>(&self, ns: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), ns)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..PostParams::default()
        }
    }
}

#[async_trait]
impl<K> TypedClient<K> for KubeClient
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default,
{
    async fn get(&self, key: &ObjectKey) -> Result<K> {
        self.api::<K>(&key.namespace)
            .get(&key.name)
            .await
            .map_err(Error::KubeError)
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::from_obj(obj)?;
        self.api::<K>(&key.namespace)
            .create(&self.post_params(), obj)
            .await
            .map_err(Error::KubeError)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::from_obj(obj)?;
        self.api::<K>(&key.namespace)
            .replace(&key.name, &self.post_params(), obj)
            .await
            .map_err(Error::KubeError)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        self.api::<K>(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(Error::KubeError)
    }
}

/// Sort a client error into the buckets the error policy cares about
pub fn classify(error: &kube::Error) -> ErrorKind {
    match error {
        kube::Error::Api(ErrorResponse { code: 404, .. }) => ErrorKind::NotFound,
        // conflicts and throttling heal on a fresh read
        kube::Error::Api(ErrorResponse { code: 409 | 429, .. }) => ErrorKind::Transient,
        kube::Error::Api(ErrorResponse { code, .. }) if *code >= 500 => ErrorKind::Transient,
        kube::Error::Api(_) => ErrorKind::Permanent,
        kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::ReadEvents(_) => {
            ErrorKind::Transient
        }
        _ => ErrorKind::Permanent,
    }
}

pub fn is_conflict(error: &Error) -> bool {
    matches!(
        error,
        Error::KubeError(kube::Error::Api(ErrorResponse { code: 409, .. }))
    )
}
