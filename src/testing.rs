//! In-memory [`TypedClient`] for exercising reconcilers without an API server.
//!
//! Objects of every kind live in one map keyed by `(kind, namespace/name)`.
//! Creates and replaces bump a resource version counter, replaces carrying a
//! stale `resourceVersion` fail with a 409, and faults can be queued per verb
//! and kind to simulate transport or conflict errors.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use kube::{Resource, error::ErrorResponse};
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, Result, client::TypedClient, key::ObjectKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Create,
    Replace,
    Delete,
}

/// A write that reached the fake store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Write {
    pub verb: Verb,
    pub kind: String,
    pub key: ObjectKey,
}

#[derive(Default)]
struct FakeState {
    objects: BTreeMap<(String, ObjectKey), serde_json::Value>,
    faults: HashMap<(Verb, String), VecDeque<kube::Error>>,
    writes: Vec<Write>,
    version: u64,
}

impl FakeState {
    fn take_fault(&mut self, verb: Verb, kind: &str) -> Result<()> {
        match self
            .faults
            .get_mut(&(verb, kind.to_string()))
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(Error::KubeError(err)),
            None => Ok(()),
        }
    }

    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn store<K: Resource + Serialize>(&mut self, kind: &str, key: &ObjectKey, obj: &K) -> Result<K>
    where
        K: Clone,
    {
        let mut obj = obj.clone();
        obj.meta_mut().resource_version = Some(self.next_version());
        let value = serde_json::to_value(&obj).map_err(Error::SerializationError)?;
        self.objects.insert((kind.to_string(), key.clone()), value);
        Ok(obj)
    }

    fn record(&mut self, verb: Verb, kind: &str, key: &ObjectKey) {
        self.writes.push(Write {
            verb,
            kind: kind.to_string(),
            key: key.clone(),
        });
    }
}

#[derive(Clone, Default)]
pub struct FakeClient {
    state: Arc<Mutex<FakeState>>,
}

fn kind_of<K: Resource<DynamicType = ()>>() -> String {
    K::kind(&()).to_string()
}

pub fn api_error(code: u16, reason: &str, message: impl Into<String>) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.into(),
        reason: reason.to_string(),
        code,
    })
}

pub fn not_found(kind: &str, key: &ObjectKey) -> kube::Error {
    api_error(404, "NotFound", format!("{kind} \"{key}\" not found"))
}

pub fn conflict(kind: &str, key: &ObjectKey) -> kube::Error {
    api_error(
        409,
        "Conflict",
        format!("Operation cannot be fulfilled on {kind} \"{key}\""),
    )
}

pub fn unavailable() -> kube::Error {
    api_error(503, "ServiceUnavailable", "the server is currently unable to handle the request")
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording a write
    pub fn insert<K>(&self, obj: K) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Serialize + Clone,
    {
        let key = ObjectKey::from_obj(&obj)?;
        self.state.lock().store(&kind_of::<K>(), &key, &obj)
    }

    pub fn object<K>(&self, key: &ObjectKey) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let value = self
            .state
            .lock()
            .objects
            .get(&(kind_of::<K>(), key.clone()))
            .cloned()?;
        serde_json::from_value(value).ok()
    }

    pub fn contains<K>(&self, key: &ObjectKey) -> bool
    where
        K: Resource<DynamicType = ()>,
    {
        self.state
            .lock()
            .objects
            .contains_key(&(kind_of::<K>(), key.clone()))
    }

    /// Queue an error returned by the next `verb` call on kind `K`
    pub fn fail_next<K: Resource<DynamicType = ()>>(&self, verb: Verb, error: kube::Error) {
        self.state
            .lock()
            .faults
            .entry((verb, kind_of::<K>()))
            .or_default()
            .push_back(error);
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().writes.clone()
    }
}

#[async_trait]
impl<K> TypedClient<K> for FakeClient
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<K> {
        let kind = kind_of::<K>();
        let value = {
            let mut state = self.state.lock();
            state.take_fault(Verb::Get, &kind)?;
            state
                .objects
                .get(&(kind.clone(), key.clone()))
                .cloned()
                .ok_or_else(|| Error::KubeError(not_found(&kind, key)))?
        };
        serde_json::from_value(value).map_err(Error::SerializationError)
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let kind = kind_of::<K>();
        let key = ObjectKey::from_obj(obj)?;
        let mut state = self.state.lock();
        state.take_fault(Verb::Create, &kind)?;
        if state.objects.contains_key(&(kind.clone(), key.clone())) {
            return Err(Error::KubeError(api_error(
                409,
                "AlreadyExists",
                format!("{kind} \"{key}\" already exists"),
            )));
        }
        let created = state.store(&kind, &key, obj)?;
        state.record(Verb::Create, &kind, &key);
        Ok(created)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let kind = kind_of::<K>();
        let key = ObjectKey::from_obj(obj)?;
        let mut state = self.state.lock();
        state.take_fault(Verb::Replace, &kind)?;
        let current_version = state
            .objects
            .get(&(kind.clone(), key.clone()))
            .ok_or_else(|| Error::KubeError(not_found(&kind, &key)))?
            .pointer("/metadata/resourceVersion")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        if let Some(expected) = obj.meta().resource_version.as_ref() {
            if current_version.as_ref() != Some(expected) {
                return Err(Error::KubeError(conflict(&kind, &key)));
            }
        }
        let replaced = state.store(&kind, &key, obj)?;
        state.record(Verb::Replace, &kind, &key);
        Ok(replaced)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let kind = kind_of::<K>();
        let mut state = self.state.lock();
        state.take_fault(Verb::Delete, &kind)?;
        state
            .objects
            .remove(&(kind.clone(), key.clone()))
            .ok_or_else(|| Error::KubeError(not_found(&kind, key)))?;
        state.record(Verb::Delete, &kind, key);
        Ok(())
    }
}
