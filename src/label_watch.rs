use std::hash::Hash;

use k8s_openapi::api::core::v1::Pod;
use kube::{Client, Resource, ResourceExt, runtime::watcher};
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::config::Settings;
use crate::informer::{DeletedObject, EventHandler, Informer};
use crate::{Error, Result};

pub const HELLO_LABEL_KEY: &str = "hello";
pub const HELLO_LABEL_VALUE: &str = "world";

/// Fires `signal` for each added object carrying the label `key=value`
pub struct LabelFilter<F> {
    key: String,
    value: String,
    signal: F,
}

impl<F> LabelFilter<F> {
    pub fn new(key: impl Into<String>, value: impl Into<String>, signal: F) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            signal,
        }
    }

    pub fn matches<K: Resource>(&self, obj: &K) -> bool {
        obj.labels().get(&self.key) == Some(&self.value)
    }
}

impl<K, F> EventHandler<K> for LabelFilter<F>
where
    K: Resource,
    K::DynamicType: Default + Eq + Hash + Clone,
    F: FnMut(&K) + Send,
{
    fn on_add(&mut self, obj: &K) {
        if self.matches(obj) {
            (self.signal)(obj);
        }
    }

    fn on_update(&mut self, _old: &K, _new: &K) {}

    fn on_delete(&mut self, _obj: &DeletedObject<K>) {}
}

/// Log "Hello World" for every pod labelled `hello=world`
pub fn hello_world() -> LabelFilter<impl FnMut(&Pod) + Send> {
    LabelFilter::new(HELLO_LABEL_KEY, HELLO_LABEL_VALUE, |pod: &Pod| {
        info!(
            pod = %pod.name_any(),
            namespace = %pod.namespace().unwrap_or_default(),
            "Hello World"
        );
    })
}

/// Watch pods and greet the labelled ones until `shutdown`.
///
/// Fails with [`Error::CacheSyncTimeout`] when the initial list does not
/// complete within the configured timeout.
pub async fn run_pod_watch(client: Client, settings: &Settings, shutdown: CancellationToken) -> Result<()> {
    let api = settings.scoped_api::<Pod>(client);
    let mut informer = Informer::<Pod>::new("pods");
    informer.subscribe(hello_world());
    let sync = informer.sync_handle();

    let stop = shutdown.child_token();
    let watch = informer.start(api, watcher::Config::default(), stop.clone());
    let check = async {
        if sync.wait_for_sync(&shutdown, settings.sync_timeout()).await {
            return Ok(());
        }
        stop.cancel();
        if shutdown.is_cancelled() {
            Ok(())
        } else {
            error!("Timed out waiting for caches to sync");
            Err(Error::CacheSyncTimeout("pods".to_string()))
        }
    };
    let ((), res) = tokio::join!(watch, check);
    res
}
