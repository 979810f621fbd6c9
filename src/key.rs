use std::fmt;

use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};

use crate::{Error, Result};

/// Identity of a namespaced object.
///
/// A `User` and the `Secret` derived from it are addressed by the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced object, failing for cluster scoped or unnamed objects
    pub fn from_obj<K: Resource>(obj: &K) -> Result<Self> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| Error::MissingObjectKey("metadata.name".to_string()))?;
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::MissingObjectKey(format!("metadata.namespace of {name}")))?;
        Ok(Self { namespace, name })
    }

    pub fn from_ref<K: Resource>(obj_ref: &ObjectRef<K>) -> Result<Self> {
        let namespace = obj_ref
            .namespace
            .clone()
            .ok_or_else(|| Error::MissingObjectKey(format!("namespace of {}", obj_ref.name)))?;
        Ok(Self::new(namespace, obj_ref.name.clone()))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    #[test]
    fn key_from_namespaced_object() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("alice".into()),
                namespace: Some("default".into()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        let key = ObjectKey::from_obj(&secret).unwrap();
        assert_eq!(key, ObjectKey::new("default", "alice"));
        assert_eq!(key.to_string(), "default/alice");
    }

    #[test]
    fn key_requires_namespace() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("alice".into()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        assert!(matches!(
            ObjectKey::from_obj(&secret),
            Err(Error::MissingObjectKey(_))
        ));
    }

    #[test]
    fn key_from_object_ref() {
        let obj_ref = ObjectRef::<Secret>::new("alice").within("default");
        assert_eq!(ObjectKey::from_ref(&obj_ref).unwrap(), ObjectKey::new("default", "alice"));
        assert!(ObjectKey::from_ref(&ObjectRef::<Secret>::new("alice")).is_err());
    }
}
