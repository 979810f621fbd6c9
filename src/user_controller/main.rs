use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{ListParams, ResourceExt},
    client::Client,
    runtime::{
        WatchStreamExt,
        controller::{self, Action, Controller},
        events::{Recorder, Reporter},
        watcher,
    },
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::*;

use super::UserReconciler;
use crate::{
    Error, Result,
    backoff::{RetryPolicy, RetryTracker},
    client::{KubeClient, TypedClient},
    config::Settings,
    crd::User,
    events_helper::emit_projection,
    informer::{DeletedObject, HandlerFuncs, Informer, QueueHandler},
    key::ObjectKey,
};

// Context for our reconciler
#[derive(Clone)]
pub struct Context<C = KubeClient> {
    /// Event recorder, absent when running without an API server
    pub recorder: Option<Recorder>,
    pub reconciler: Arc<UserReconciler<C>>,
    /// Consecutive failures per key
    pub retries: Arc<RetryTracker>,
    pub retry_policy: RetryPolicy,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
}

async fn reconcile_user<C>(user: Arc<User>, ctx: Arc<Context<C>>) -> Result<Action>
where
    C: TypedClient<User> + TypedClient<Secret> + 'static,
{
    let key = ObjectKey::from_obj(user.as_ref())?;
    info!(%key, "Reconciling User");

    match ctx.reconciler.reconcile(&key).await {
        Ok(outcome) => {
            ctx.retries.reset(&key.to_string());
            ctx.diagnostics.write().await.record_success(&key);
            if let Some(recorder) = &ctx.recorder {
                emit_projection(recorder, &user, outcome).await;
            }
            Ok(outcome.action())
        }
        Err(e) => {
            if e.requeue() {
                ctx.diagnostics.write().await.record_failure(&key.to_string());
            }
            Err(e)
        }
    }
}

fn user_error_policy<C>(user: Arc<User>, error: &Error, ctx: Arc<Context<C>>) -> Action {
    let key = match ObjectKey::from_obj(user.as_ref()) {
        Ok(key) => key.to_string(),
        Err(_) => user.name_any(),
    };
    ctx.retry_policy.action_for(&ctx.retries, &key, error)
}

/// Drop the retry count of deleted `User`s, including those never reconciled again
fn forget_deleted(retries: Arc<RetryTracker>) -> HandlerFuncs<User> {
    HandlerFuncs::default().with_delete(move |obj: &DeletedObject<User>| {
        if let Ok(key) = ObjectKey::from_ref(&obj.object_ref()) {
            retries.reset(&key.to_string());
        }
    })
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    pub last_key: Option<String>,
    pub reconciled: u64,
    pub failed: u64,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            last_key: None,
            reconciled: 0,
            failed: 0,
            reporter: "user-controller".into(),
        }
    }
}
impl Diagnostics {
    fn recorder(&self, client: Client) -> Recorder {
        Recorder::new(client, self.reporter.clone())
    }

    pub fn record_success(&mut self, key: &ObjectKey) {
        self.last_event = Utc::now();
        self.last_key = Some(key.to_string());
        self.reconciled += 1;
    }

    pub fn record_failure(&mut self, key: &str) {
        self.last_event = Utc::now();
        self.last_key = Some(key.to_string());
        self.failed += 1;
    }
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
}

impl State {
    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub async fn to_context(&self, client: Client, settings: &Settings, shutdown: CancellationToken) -> Arc<Context> {
        Arc::new(Context {
            recorder: Some(self.diagnostics.read().await.recorder(client.clone())),
            reconciler: Arc::new(UserReconciler::new(KubeClient::new(client), shutdown)),
            retries: Arc::new(RetryTracker::default()),
            retry_policy: settings.retry_policy(),
            diagnostics: self.diagnostics.clone(),
        })
    }
}

/// Run the `User` controller against the API server until `shutdown`
pub async fn run_user(state: State, client: Client, settings: Settings, shutdown: CancellationToken) -> Result<()> {
    let api_user = settings.scoped_api::<User>(client.clone());
    if let Err(e) = api_user.list(&ListParams::default().limit(1)).await {
        error!("User CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin gencrd && kubectl apply -f user.yaml");
        return Err(Error::CrdNotInstalled(e.to_string()));
    }

    let events = watcher::watcher(api_user, watcher::Config::default()).default_backoff();
    let ctx = state.to_context(client, &settings, shutdown.clone()).await;
    run_controller(Informer::new("users"), events, ctx, &settings, shutdown).await
}

/// Feed `events` through `informer` into the work queue and reconcile until `shutdown`.
///
/// Reconciles start only once the informer cache has synced; a sync timeout
/// stops the informer and fails with [`Error::CacheSyncTimeout`].
pub async fn run_controller<C, S>(
    mut informer: Informer<User>,
    events: S,
    ctx: Arc<Context<C>>,
    settings: &Settings,
    shutdown: CancellationToken,
) -> Result<()>
where
    C: TypedClient<User> + TypedClient<Secret> + 'static,
    S: Stream<Item = watcher::Result<watcher::Event<User>>>,
{
    let (queue, requests) = QueueHandler::channel();
    informer.subscribe(queue);
    informer.subscribe(forget_deleted(ctx.retries.clone()));
    let store = informer.store();
    let sync = informer.sync_handle();

    let stop = shutdown.child_token();
    let watch = informer.run(events, stop.clone());

    let controller = async {
        if !sync.wait_for_sync(&shutdown, settings.sync_timeout()).await {
            stop.cancel();
            if shutdown.is_cancelled() {
                return Ok(());
            }
            error!("Timed out waiting for caches to sync");
            return Err(Error::CacheSyncTimeout("users".to_string()));
        }

        Controller::for_stream(requests, store)
            .with_config(controller::Config::default().concurrency(settings.concurrency))
            .graceful_shutdown_on(shutdown.clone().cancelled_owned())
            .run(reconcile_user::<C>, user_error_policy::<C>, ctx)
            .for_each(async |res| match res {
                Ok((obj, _)) => debug!(user = %obj.name, "Reconciled"),
                Err(e) => debug!(error = %e, "Reconcile loop error"),
            })
            .await;
        stop.cancel();
        Ok(())
    };

    let ((), res) = tokio::join!(watch, controller);
    res
}
