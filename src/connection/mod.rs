pub mod local;
pub mod remote;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use ewebridge_api::config::{AppConfig, Transport};
use ewelink::cloud::Session;
use ewelink::{Device, DeviceState, SocketMessage};

use crate::error::{ApiError, ApiResult};

pub use local::LocalConnection;
pub use remote::RemoteConnection;

/// Result of a successful [`Connection::activate_connection`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authentication {
    /// Logged in to a cloud account.
    Account(Session),
    /// Local network discovery is running.
    Lan { api_key: String },
}

/// Uniform access to the devices, whichever transport is in use.
///
/// None of the device operations fail: errors are logged, and reported to
/// the caller as `None`, meaning "state unknown, do not act".
#[async_trait]
pub trait Connection: Send + Sync {
    /// Log in, or start discovery. Idempotent once authenticated.
    async fn activate_connection(&self) -> Option<Authentication>;

    async fn request_devices(&self) -> Option<Vec<Device>>;

    async fn request_device(&self, device_id: &str) -> Option<Device>;

    /// Current raw state. A device-level failure (device offline, unknown
    /// device) is reported as a [`DeviceState`] with an error code.
    async fn request_device_state(&self, device_id: &str) -> Option<DeviceState>;

    async fn attempt_set_device_state(&self, device_id: &str, state: &str) -> Option<DeviceState>;

    /// Start delivering push updates to `sink`.
    async fn open_monitoring_socket(&self, sink: UnboundedSender<SocketMessage>) -> ApiResult<()>;

    async fn close_monitoring_socket(&self);
}

/// Build the connection selected by the configuration.
pub fn from_config(config: &AppConfig) -> ApiResult<Arc<dyn Connection>> {
    match config.transport() {
        Transport::Remote(creds) => {
            log::info!("Using eWeLink cloud connection for [{}]", creds.email);
            Ok(Arc::new(RemoteConnection::new(creds)?))
        }
        Transport::Local => {
            log::info!("No cloud credentials configured, using local network connection");
            Ok(Arc::new(LocalConnection::new()?))
        }
    }
}

/// Holds requests back until authentication has happened.
///
/// Accessories restored from the host cache can ask for state long before
/// the startup login finishes, so requests wait for a bounded number of
/// backoff periods before giving up.
#[derive(Debug)]
pub struct AuthGate {
    open: AtomicBool,
    attempts: u32,
    backoff: Duration,
}

impl Default for AuthGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthGate {
    pub const ATTEMPTS: u32 = 3;
    pub const BACKOFF: Duration = Duration::from_secs(10);

    #[must_use]
    pub const fn new() -> Self {
        Self::with_policy(Self::ATTEMPTS, Self::BACKOFF)
    }

    #[must_use]
    pub const fn with_policy(attempts: u32, backoff: Duration) -> Self {
        Self {
            open: AtomicBool::new(false),
            attempts,
            backoff,
        }
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Wait until the gate opens, retrying up to the configured number of
    /// attempts before failing with [`ApiError::NotAuthenticated`].
    pub async fn wait(&self) -> ApiResult<()> {
        let mut attempt = 0;
        while !self.is_open() {
            if attempt >= self.attempts {
                return Err(ApiError::NotAuthenticated {
                    attempts: self.attempts,
                });
            }
            attempt += 1;
            log::debug!(
                "Connection not authenticated yet, retry {attempt}/{} in {:?}",
                self.attempts,
                self.backoff
            );
            tokio::time::sleep(self.backoff).await;
        }
        Ok(())
    }
}

/// Run a fallible connection operation, logging and absorbing any error.
pub(crate) async fn absorb<T>(
    transport: &str,
    op: &str,
    fut: impl Future<Output = ApiResult<T>> + Send,
) -> Option<T> {
    match fut.await {
        Ok(value) => Some(value),
        Err(err) => {
            log::error!(
                "The following error was encountered by the {transport} connection while attempting to execute function [{op}] {err}"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use crate::connection::{AuthGate, absorb};
    use crate::error::{ApiError, ApiResult};

    #[tokio::test(start_paused = true)]
    async fn gate_gives_up_after_bounded_attempts() {
        let gate = AuthGate::new();
        let start = Instant::now();

        let err = gate.wait().await.unwrap_err();

        assert!(matches!(err, ApiError::NotAuthenticated { attempts: 3 }));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn gate_releases_when_opened() {
        let gate = Arc::new(AuthGate::new());
        let start = Instant::now();

        let opener = gate.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            opener.open();
        });

        gate.wait().await.unwrap();
        // checked at 0s, 10s (closed), 20s (open)
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn open_gate_does_not_wait() {
        let gate = AuthGate::with_policy(1, Duration::from_secs(60));
        gate.open();
        let start = Instant::now();

        gate.wait().await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        gate.close();
        assert!(gate.wait().await.is_err());
    }

    #[tokio::test]
    async fn absorb_turns_errors_into_none() {
        let ok: Option<u32> = absorb("test", "ok", async { ApiResult::Ok(7) }).await;
        assert_eq!(ok, Some(7));

        let failed: Option<u32> = absorb("test", "failing", async {
            Err(ApiError::service_error("boom"))
        })
        .await;
        assert_eq!(failed, None);
    }
}
