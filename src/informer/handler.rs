use std::hash::Hash;
use std::sync::Arc;

use futures::channel::mpsc;
use kube::Resource;
use kube::runtime::{reflector::ObjectRef, watcher};
use tracing::*;

/// Final state of a deleted object.
///
/// When deletions are only noticed through a relist, the last body is not
/// known and only the key is delivered.
pub enum DeletedObject<K>
where
    K: Resource,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    Typed(Arc<K>),
    Tombstone(ObjectRef<K>),
}

impl<K> DeletedObject<K>
where
    K: Resource,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    pub fn object_ref(&self) -> ObjectRef<K> {
        match self {
            DeletedObject::Typed(obj) => ObjectRef::from_obj(obj.as_ref()),
            DeletedObject::Tombstone(obj_ref) => obj_ref.clone(),
        }
    }

    pub fn object(&self) -> Option<&K> {
        match self {
            DeletedObject::Typed(obj) => Some(obj.as_ref()),
            DeletedObject::Tombstone(_) => None,
        }
    }
}

/// Receives notifications from an [`Informer`](super::Informer).
///
/// All handlers of one informer run in sequence on its dispatch task, after
/// the cache has been updated. They must not block; hand long work to a queue.
pub trait EventHandler<K>: Send
where
    K: Resource,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    fn on_add(&mut self, obj: &K);
    fn on_update(&mut self, old: &K, new: &K);
    fn on_delete(&mut self, obj: &DeletedObject<K>);
}

type AddFn<K> = Box<dyn FnMut(&K) + Send>;
type UpdateFn<K> = Box<dyn FnMut(&K, &K) + Send>;
type DeleteFn<K> = Box<dyn FnMut(&DeletedObject<K>) + Send>;

/// [`EventHandler`] assembled from optional closures; missing ones ignore the event
pub struct HandlerFuncs<K>
where
    K: Resource + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    add: Option<AddFn<K>>,
    update: Option<UpdateFn<K>>,
    delete: Option<DeleteFn<K>>,
}

impl<K> Default for HandlerFuncs<K>
where
    K: Resource + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            add: None,
            update: None,
            delete: None,
        }
    }
}

impl<K> HandlerFuncs<K>
where
    K: Resource + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    #[must_use]
    pub fn with_add(mut self, f: impl FnMut(&K) + Send + 'static) -> Self {
        self.add = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_update(mut self, f: impl FnMut(&K, &K) + Send + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_delete(mut self, f: impl FnMut(&DeletedObject<K>) + Send + 'static) -> Self {
        self.delete = Some(Box::new(f));
        self
    }
}

impl<K> EventHandler<K> for HandlerFuncs<K>
where
    K: Resource + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    fn on_add(&mut self, obj: &K) {
        if let Some(f) = self.add.as_mut() {
            f(obj);
        }
    }

    fn on_update(&mut self, old: &K, new: &K) {
        if let Some(f) = self.update.as_mut() {
            f(old, new);
        }
    }

    fn on_delete(&mut self, obj: &DeletedObject<K>) {
        if let Some(f) = self.delete.as_mut() {
            f(obj);
        }
    }
}

/// Forwards added and updated objects to a controller work queue.
///
/// The receiving end is the trigger stream of
/// [`Controller::for_stream`](kube::runtime::Controller::for_stream), which
/// deduplicates pending keys and serializes reconciles per key.
/// Deletions are not forwarded: the runtime drops keys missing from the cache.
pub struct QueueHandler<K> {
    tx: mpsc::UnboundedSender<watcher::Result<K>>,
}

impl<K> QueueHandler<K> {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<watcher::Result<K>>) {
        let (tx, rx) = mpsc::unbounded();
        (Self { tx }, rx)
    }

    fn enqueue(&self, obj: K) {
        if self.tx.unbounded_send(Ok(obj)).is_err() {
            debug!("Work queue closed, dropping notification");
        }
    }
}

impl<K> EventHandler<K> for QueueHandler<K>
where
    K: Resource + Clone + Send,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    fn on_add(&mut self, obj: &K) {
        self.enqueue(obj.clone());
    }

    fn on_update(&mut self, _old: &K, new: &K) {
        self.enqueue(new.clone());
    }

    fn on_delete(&mut self, _obj: &DeletedObject<K>) {}
}
