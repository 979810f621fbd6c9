use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Missing Object Key: {0}")]
    MissingObjectKey(String),

    #[error("Timed out waiting for {0} cache to sync")]
    CacheSyncTimeout(String),

    #[error("CRD Not Installed: {0}")]
    CrdNotInstalled(String),

    #[error("Cancelled")]
    Cancelled,

    /// NB: this is a catch-all for any other errors
    #[error("Other Error: {0}")]
    OtherError(String),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// How the controller runtime should treat a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An expected absence, branched on by the reconciler
    NotFound,
    /// Transport failures, conflicts, throttling and server errors
    Transient,
    /// Decode failures, authorization errors and anything else that will not heal by itself
    Permanent,
    /// The shutdown token fired while a call was in flight
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::KubeError(e) => client::classify(e),
            Error::Cancelled => ErrorKind::Cancelled,
            Error::CacheSyncTimeout(_) => ErrorKind::Transient,
            _ => ErrorKind::Permanent,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether the runtime should schedule the key again
    pub fn requeue(&self) -> bool {
        self.kind() != ErrorKind::Cancelled
    }
}

pub mod backoff;
pub mod client;
pub mod config;
pub mod crd;
pub mod events_helper;
pub mod informer;
pub mod key;
pub mod label_watch;
pub mod rbac;
pub mod user_controller;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

/// Log and trace integrations
pub mod telemetry;
