//! Runtime settings, read from flags or the environment.

use std::time::Duration;

use clap::{ArgAction, Parser};
use kube::{Api, Client, Resource, core::NamespaceResourceScope};

use crate::{backoff::RetryPolicy, telemetry::LogFormat};

#[derive(Parser, Debug, Clone)]
#[command(name = "user-operator", version, about = "Projects User resources into Secrets")]
pub struct Settings {
    /// Namespace to watch; all namespaces when unset
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Parallel reconciles, 0 for unbounded
    #[arg(long, env = "RECONCILE_CONCURRENCY", default_value_t = 4)]
    pub concurrency: u16,

    /// Seconds to wait for an informer cache to sync
    #[arg(long, env = "CACHE_SYNC_TIMEOUT_SECS", default_value_t = 60)]
    pub sync_timeout_secs: u64,

    #[arg(long, env = "RETRY_BASE_SECS", default_value_t = 1)]
    pub retry_base_secs: u64,

    #[arg(long, env = "RETRY_MAX_SECS", default_value_t = 300)]
    pub retry_max_secs: u64,

    /// Run the `hello=world` pod label watch
    #[arg(long, env = "POD_WATCH", default_value_t = true, action = ArgAction::Set)]
    pub pod_watch: bool,

    /// Address of the health and diagnostics server
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

impl Settings {
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let base = Duration::from_secs(self.retry_base_secs.max(1));
        RetryPolicy {
            base,
            max: Duration::from_secs(self.retry_max_secs).max(base),
        }
    }

    /// Api scoped to the configured namespace
    pub fn scoped_api<K>(&self, client: Client) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::try_parse_from(["user-operator"]).unwrap();
        assert_eq!(settings.namespace, None);
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.sync_timeout(), Duration::from_secs(60));
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert!(settings.pod_watch);
        assert_eq!(settings.listen, "0.0.0.0:8080");
        assert_eq!(settings.log_format, LogFormat::Compact);
    }

    #[test]
    fn flags_override_defaults() {
        let settings = Settings::try_parse_from([
            "user-operator",
            "--namespace",
            "ops",
            "--concurrency",
            "0",
            "--retry-base-secs",
            "2",
            "--retry-max-secs",
            "30",
            "--pod-watch",
            "false",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(settings.namespace.as_deref(), Some("ops"));
        assert_eq!(settings.concurrency, 0);
        assert_eq!(
            settings.retry_policy(),
            RetryPolicy {
                base: Duration::from_secs(2),
                max: Duration::from_secs(30),
            }
        );
        assert!(!settings.pod_watch);
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn retry_cap_never_below_base() {
        let settings =
            Settings::try_parse_from(["user-operator", "--retry-base-secs", "10", "--retry-max-secs", "3"])
                .unwrap();
        let policy = settings.retry_policy();
        assert_eq!(policy.max, policy.base);
    }
}
