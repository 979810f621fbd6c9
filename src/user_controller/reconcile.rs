use std::collections::BTreeMap;
use std::future::Future;

use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::client::{TypedClient, is_conflict};
use crate::crd::{User, UserSpec};
use crate::key::ObjectKey;
use crate::{Error, Result};

pub const ID_KEY: &str = "id";
pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";

/// What a successful pass did to the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// No `User` under the key; nothing to converge
    UserAbsent,
    SecretCreated,
    SecretUpdated,
}

impl Outcome {
    /// Every successful pass is terminal: the `User` is gone afterwards
    pub fn action(&self) -> Action {
        Action::await_change()
    }
}

/// The `stringData` payload derived from a spec
pub fn string_data(spec: &UserSpec) -> BTreeMap<String, String> {
    BTreeMap::from([
        (ID_KEY.to_string(), spec.id.to_string()),
        (USERNAME_KEY.to_string(), spec.username.clone()),
        (PASSWORD_KEY.to_string(), spec.password.clone()),
    ])
}

/// Secret projected from `spec`, addressed by the same key as its `User`
pub fn secret_for(key: &ObjectKey, spec: &UserSpec) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(key.name.clone()),
            namespace: Some(key.namespace.clone()),
            ..ObjectMeta::default()
        },
        string_data: Some(string_data(spec)),
        ..Secret::default()
    }
}

/// Level-triggered reconciler for `User` keys.
///
/// Every pass re-reads the `User` and its `Secret`, so passes for the same key
/// can be coalesced or repeated without changing the end state.
pub struct UserReconciler<C> {
    client: C,
    shutdown: CancellationToken,
}

impl<C> UserReconciler<C>
where
    C: TypedClient<User> + TypedClient<Secret>,
{
    pub fn new(client: C, shutdown: CancellationToken) -> Self {
        Self { client, shutdown }
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome> {
        let user: User = match self.call(TypedClient::<User>::get(&self.client, key)).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                debug!(%key, "User not found, nothing to do");
                return Ok(Outcome::UserAbsent);
            }
            Err(e) => return Err(e),
        };

        let outcome = match self.call(TypedClient::<Secret>::get(&self.client, key)).await {
            Ok(existing) => {
                self.update_secret(key, &user.spec, &existing).await?;
                Outcome::SecretUpdated
            }
            Err(e) if e.is_not_found() => {
                self.create_secret(key, &user.spec).await?;
                Outcome::SecretCreated
            }
            Err(e) => return Err(e),
        };

        match self.call(TypedClient::<User>::delete(&self.client, key)).await {
            Ok(()) => info!(%key, "Deleted User after projecting it"),
            Err(e) if e.is_not_found() => debug!(%key, "User already deleted"),
            Err(e) => return Err(e),
        }
        Ok(outcome)
    }

    async fn create_secret(&self, key: &ObjectKey, spec: &UserSpec) -> Result<()> {
        let secret = secret_for(key, spec);
        match self.call(TypedClient::<Secret>::create(&self.client, &secret)).await {
            Ok(_) => {
                info!(%key, "Created Secret");
                Ok(())
            }
            Err(e) => {
                if is_conflict(&e) {
                    debug!(%key, "Secret appeared since it was read, retrying");
                }
                Err(e)
            }
        }
    }

    async fn update_secret(&self, key: &ObjectKey, spec: &UserSpec, existing: &Secret) -> Result<()> {
        let mut secret = secret_for(key, spec);
        // replace only the version we observed
        secret.metadata.resource_version = existing.metadata.resource_version.clone();
        match self.call(TypedClient::<Secret>::replace(&self.client, &secret)).await {
            Ok(_) => {
                info!(%key, "Updated Secret");
                Ok(())
            }
            Err(e) => {
                if is_conflict(&e) {
                    debug!(%key, "Secret changed since it was read, retrying");
                }
                Err(e)
            }
        }
    }

    /// Race a client call against shutdown
    async fn call<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(Error::Cancelled),
            res = request => res,
        }
    }
}

#[cfg(test)]
mod tests;
