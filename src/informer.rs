//! Shared-cache watch pipeline.
//!
//! An [`Informer`] consumes a watch event stream, keeps the latest view of
//! every object in a [`Store`] and notifies subscribed [`EventHandler`]s
//! after the cache has been updated. A relist (the `Init` .. `InitDone`
//! sequence the watcher emits after a gap) is diffed against the previous
//! view so handlers see adds, updates and deletions they would otherwise
//! have missed.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use kube::{
    Api, Resource,
    runtime::{
        WatchStreamExt,
        reflector::{self, ObjectRef, Store, store::Writer},
        watcher::{self, Event},
    },
};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::*;

mod handler;
pub use handler::*;

pub struct Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    name: String,
    reader: Store<K>,
    writer: Writer<K>,
    handlers: Vec<Box<dyn EventHandler<K>>>,
    relist: Option<Vec<K>>,
    synced: watch::Sender<bool>,
}

impl<K> Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    pub fn new(name: impl Into<String>) -> Self {
        let (reader, writer) = reflector::store();
        let (synced, _) = watch::channel(false);
        Self {
            name: name.into(),
            reader,
            writer,
            handlers: Vec::new(),
            relist: None,
            synced,
        }
    }

    /// Register a handler; it sees every notification dispatched after this call
    pub fn subscribe(&mut self, handler: impl EventHandler<K> + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Read-only view of the cache
    pub fn store(&self) -> Store<K> {
        self.reader.clone()
    }

    pub fn sync_handle(&self) -> SyncHandle {
        SyncHandle {
            name: self.name.clone(),
            rx: self.synced.subscribe(),
        }
    }

    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Drive the informer from `events` until the stream ends or `shutdown` fires.
    ///
    /// Stream errors are logged and skipped; the watcher recovers by relisting.
    pub async fn run<S>(mut self, events: S, shutdown: CancellationToken)
    where
        S: Stream<Item = watcher::Result<Event<K>>>,
    {
        let mut events = pin!(events);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    debug!(informer = %self.name, "Informer stopped");
                    break;
                }
                event = events.next() => match event {
                    Some(Ok(event)) => self.process(event),
                    Some(Err(e)) => warn!(informer = %self.name, error = %e, "Watch failed, waiting for relist"),
                    None => {
                        debug!(informer = %self.name, "Watch stream ended");
                        break;
                    }
                },
            }
        }
    }

    /// Watch `api` with the default backoff and run until `shutdown`
    pub async fn start(self, api: Api<K>, config: watcher::Config, shutdown: CancellationToken)
    where
        K: DeserializeOwned + Debug + Send + 'static,
    {
        let events = watcher::watcher(api, config).default_backoff();
        self.run(events, shutdown).await;
    }

    fn process(&mut self, event: Event<K>) {
        match &event {
            Event::Apply(obj) => {
                let old = self.reader.get(&ObjectRef::from_obj(obj));
                self.writer.apply_watcher_event(&event);
                match old {
                    Some(old) => self.notify_update(&old, obj),
                    None => self.notify_add(obj),
                }
            }
            Event::Delete(obj) => {
                self.writer.apply_watcher_event(&event);
                self.notify_delete(&DeletedObject::Typed(Arc::new(obj.clone())));
            }
            Event::Init => {
                self.relist = Some(Vec::new());
                self.writer.apply_watcher_event(&event);
            }
            Event::InitApply(obj) => {
                self.relist.get_or_insert_with(Vec::new).push(obj.clone());
                self.writer.apply_watcher_event(&event);
            }
            Event::InitDone => {
                let previous: HashMap<ObjectRef<K>, Arc<K>> = self
                    .reader
                    .state()
                    .into_iter()
                    .map(|obj| (ObjectRef::from_obj(obj.as_ref()), obj))
                    .collect();
                self.writer.apply_watcher_event(&event);
                let listed = self.relist.take().unwrap_or_default();
                self.replay(previous, listed);
                if !self.synced.send_replace(true) {
                    info!(informer = %self.name, "Cache synced");
                }
            }
        }
    }

    /// Notify the difference between the cache before a relist and the relisted objects
    fn replay(&mut self, mut previous: HashMap<ObjectRef<K>, Arc<K>>, listed: Vec<K>) {
        for obj in &listed {
            match previous.remove(&ObjectRef::from_obj(obj)) {
                None => self.notify_add(obj),
                Some(old) if old.meta().resource_version != obj.meta().resource_version => {
                    self.notify_update(&old, obj)
                }
                Some(_) => {}
            }
        }
        for (obj_ref, _) in previous {
            self.notify_delete(&DeletedObject::Tombstone(obj_ref));
        }
    }

    fn notify_add(&mut self, obj: &K) {
        for handler in self.handlers.iter_mut() {
            handler.on_add(obj);
        }
    }

    fn notify_update(&mut self, old: &K, new: &K) {
        for handler in self.handlers.iter_mut() {
            handler.on_update(old, new);
        }
    }

    fn notify_delete(&mut self, obj: &DeletedObject<K>) {
        for handler in self.handlers.iter_mut() {
            handler.on_delete(obj);
        }
    }
}

/// Observes whether an informer has completed its initial list
#[derive(Clone)]
pub struct SyncHandle {
    name: String,
    rx: watch::Receiver<bool>,
}

impl SyncHandle {
    pub fn has_synced(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the initial list has been applied.
    ///
    /// Returns false when `timeout` elapses, `shutdown` fires or the informer
    /// stops before syncing.
    pub async fn wait_for_sync(&self, shutdown: &CancellationToken, timeout: Duration) -> bool {
        let synced = tokio::select! {
            biased;
            () = shutdown.cancelled() => false,
            res = tokio::time::timeout(timeout, wait_synced(self.rx.clone())) => res.unwrap_or(false),
        };
        if !synced {
            warn!(informer = %self.name, "Cache did not sync");
        }
        synced
    }
}

async fn wait_synced(mut rx: watch::Receiver<bool>) -> bool {
    rx.wait_for(|synced| *synced).await.is_ok()
}
