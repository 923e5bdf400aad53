//! Connectivity monitor.
//!
//! Keeps a passive online flag fed by the platform and answers active
//! reachability checks against the backend health endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::util::normalize_http_base_url;
use crate::{Error, Result};

pub const DEFAULT_HEALTH_PATH: &str = "/api/health";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(4);

/// Active reachability check
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// `true` when the backend answered; never errors
    async fn probe(&self) -> bool;
}

/// Probe that sends `HEAD {base}{path}` and accepts any 2xx answer.
pub struct HttpHealthProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(base_url: &str, health_path: &str, timeout: Duration) -> Result<Self> {
        let base_url = normalize_http_base_url(base_url).ok_or_else(|| {
            Error::Config("health probe URL must include http:// or https://".to_string())
        })?;
        let path = health_path.trim();
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            url: format!("{base_url}{path}"),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpHealthProbe {
    async fn probe(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    "Health probe {} answered HTTP {}",
                    self.url,
                    response.status().as_u16()
                );
                false
            }
            Err(error) => {
                tracing::warn!("Health probe {} failed: {error}", self.url);
                false
            }
        }
    }
}

/// Probe with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn probe(&self) -> bool {
        self.0
    }
}

/// Shared online/offline flag.
///
/// Clones observe and update the same flag.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    online: Arc<watch::Sender<bool>>,
    probe: Arc<dyn ConnectivityProbe>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool, probe: Arc<dyn ConnectivityProbe>) -> Self {
        let (online, _) = watch::channel(initially_online);
        Self {
            online: Arc::new(online),
            probe,
        }
    }

    /// Monitor whose active probe always agrees with the passive flag
    pub fn fixed(initially_online: bool) -> Self {
        Self::new(initially_online, Arc::new(StaticProbe(true)))
    }

    /// Passive flag, as last reported by the platform
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Record a platform connectivity signal.
    pub fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                tracing::info!("Connectivity restored");
            } else {
                tracing::info!("Connectivity lost");
            }
        }
    }

    /// Receiver notified on every transition
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Confirm the backend is reachable.
    ///
    /// Returns `false` without probing when the passive flag is down.
    pub async fn verify_connectivity(&self) -> bool {
        if !self.is_online() {
            return false;
        }
        self.probe.probe().await
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct CountingProbe(AtomicUsize);

    #[async_trait]
    impl ConnectivityProbe for CountingProbe {
        async fn probe(&self) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test]
    async fn verify_skips_probe_while_offline() {
        let probe = Arc::new(CountingProbe(AtomicUsize::new(0)));
        let monitor = ConnectivityMonitor::new(false, probe.clone());

        assert!(!monitor.verify_connectivity().await);
        assert_eq!(probe.0.load(Ordering::SeqCst), 0);

        monitor.set_online(true);
        assert!(monitor.verify_connectivity().await);
        assert_eq!(probe.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn verify_reports_failed_probe() {
        let monitor = ConnectivityMonitor::new(true, Arc::new(StaticProbe(false)));
        assert!(monitor.is_online());
        assert!(!monitor.verify_connectivity().await);
    }

    #[tokio::test]
    async fn subscribers_see_transitions_only() {
        let monitor = ConnectivityMonitor::fixed(true);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn http_probe_accepts_success() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let probe =
            HttpHealthProbe::new(&server.uri(), DEFAULT_HEALTH_PATH, DEFAULT_PROBE_TIMEOUT)
                .unwrap();
        assert!(probe.probe().await);
    }

    #[tokio::test]
    async fn http_probe_rejects_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = HttpHealthProbe::new(&server.uri(), "healthz", DEFAULT_PROBE_TIMEOUT).unwrap();
        assert!(probe.url().ends_with("/healthz"));
        assert!(!probe.probe().await);
    }

    #[test]
    fn http_probe_requires_scheme() {
        assert!(HttpHealthProbe::new("localhost", DEFAULT_HEALTH_PATH, DEFAULT_PROBE_TIMEOUT)
            .is_err());
    }
}
