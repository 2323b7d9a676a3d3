use crate::config::RenewalConfig;
use crate::credentials::client::RenewalClient;
use crate::credentials::gate::AccessGate;
use crate::credentials::jwt::expiry_from_jwt;
use crate::credentials::map::CredentialMap;
use crate::credentials::owner::{DefaultOwner, OwnerResolver};
use crate::credentials::renewal::{run_sweep, RenewalLoop, SweepReport, WorkerStatus};
use crate::credentials::types::{Clock, CredentialEntry, Result, SystemClock, TokenError};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// State shared between the manager and its renewal worker
pub(crate) struct Shared {
    pub(crate) map: CredentialMap,
    pub(crate) gate: AccessGate,
    pub(crate) status: parking_lot::Mutex<WorkerStatus>,
    pub(crate) sweep_lock: tokio::sync::Mutex<()>,
    pub(crate) config: RenewalConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) client: Arc<dyn RenewalClient>,
}

/// Builder for [`TokenManager`]
pub struct TokenManagerBuilder {
    client: Arc<dyn RenewalClient>,
    config: RenewalConfig,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn OwnerResolver>,
}

impl TokenManagerBuilder {
    pub fn with_config(mut self, config: RenewalConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the wall clock used to decide which entries are due
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Strategy used by [`TokenManager::current`] and friends
    pub fn with_owner_resolver(mut self, resolver: impl OwnerResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Validate the configuration and assemble the manager
    pub fn build(self) -> Result<TokenManager> {
        self.config.validate()?;

        Ok(TokenManager {
            shared: Arc::new(Shared {
                map: CredentialMap::new(),
                gate: AccessGate::new(),
                status: parking_lot::Mutex::new(WorkerStatus::NotStarted),
                sweep_lock: tokio::sync::Mutex::new(()),
                config: self.config,
                clock: self.clock,
                client: self.client,
            }),
            resolver: self.resolver,
            shutdown: CancellationToken::new(),
            worker: parking_lot::Mutex::new(None),
        })
    }
}

/// Consumer-facing credential manager
///
/// Holds per-owner credentials, runs the background renewal worker and gates
/// reads so that no caller observes a credential while a sweep is replacing
/// it.
///
/// # Example
///
/// ```no_run
/// use tokenkeeper::{HttpRenewalClient, RenewalConfig, TokenManager};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RenewalConfig::from_env()?
///     .with_renewal_url("https://auth.example.com/token/renew");
/// let client = HttpRenewalClient::from_config(&config)?;
///
/// let manager = TokenManager::new(client, config)?;
/// manager.start()?;
///
/// manager.register("session-1", "initial-token", 1_900_000_000)?;
/// let header = manager.bearer_header("session-1").await?;
/// println!("Authorization: {}", header);
///
/// manager.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct TokenManager {
    shared: Arc<Shared>,
    resolver: Arc<dyn OwnerResolver>,
    shutdown: CancellationToken,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl TokenManager {
    /// Create a manager with the system clock and the default owner resolver
    ///
    /// Fails if `config` does not validate. The renewal worker does not run
    /// until [`TokenManager::start`].
    pub fn new(client: impl RenewalClient + 'static, config: RenewalConfig) -> Result<Self> {
        Self::builder(client).with_config(config).build()
    }

    pub fn builder(client: impl RenewalClient + 'static) -> TokenManagerBuilder {
        TokenManagerBuilder {
            client: Arc::new(client),
            config: RenewalConfig::default(),
            clock: Arc::new(SystemClock),
            resolver: Arc::new(DefaultOwner),
        }
    }

    /// Spawn the renewal worker on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(TokenError::Lifecycle("renewal worker already started".to_string()));
        }
        if self.shutdown.is_cancelled() {
            return Err(TokenError::Lifecycle("manager has been shut down".to_string()));
        }
        if let Some(err) = self.shared.status.lock().error() {
            return Err(TokenError::WorkerFailed(err.clone()));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            TokenError::Lifecycle(format!("no tokio runtime available: {}", e))
        })?;

        *self.shared.status.lock() = WorkerStatus::Running;
        let renewal = RenewalLoop::new(self.shared.clone(), self.shutdown.clone());
        *worker = Some(runtime.spawn(renewal.run()));
        Ok(())
    }

    /// Register or replace the credential for `owner`
    ///
    /// Malformed input is logged and rejected; the error is safe to ignore.
    pub fn register(&self, owner: &str, token: &str, expires_at: i64) -> Result<()> {
        self.shared.map.register(owner, token, expires_at)
    }

    /// Register a JWT, taking the expiry from its `exp` claim
    pub fn register_jwt(&self, owner: &str, token: &str) -> Result<()> {
        let expires_at = expiry_from_jwt(token).map_err(|e| {
            tracing::warn!(owner = %owner, error = %e, "Rejected JWT registration");
            TokenError::Registration {
                owner: owner.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.register(owner, token, expires_at)
    }

    /// Register for the owner resolved from the current context
    pub fn register_current(&self, token: &str, expires_at: i64) -> Result<()> {
        self.register(&self.resolver.resolve(), token, expires_at)
    }

    /// Remove the credential for `owner`; `false` if none was registered
    pub fn unregister(&self, owner: &str) -> bool {
        self.shared.map.unregister(owner)
    }

    /// The current credential for `owner`
    ///
    /// Waits out an in-progress sweep, bounded by `renewal_buffer +
    /// gate_wait_margin` per attempt across at most `gate_wait_attempts`
    /// attempts. Fails on the first timeout when the worker is stopped or
    /// dead.
    pub async fn get(&self, owner: &str) -> Result<CredentialEntry> {
        let timeout = self.shared.config.gate_wait_timeout();
        let max_attempts = self.shared.config.gate_wait_attempts.max(1);

        for attempt in 1..=max_attempts {
            if self.shared.gate.wait(timeout).await {
                return self
                    .shared
                    .map
                    .get(owner)
                    .ok_or_else(|| TokenError::NotFound(owner.to_string()));
            }

            match self.worker_status() {
                WorkerStatus::Failed(err) => {
                    tracing::error!(
                        owner = %owner,
                        error = %err,
                        "Credential access blocked by dead renewal worker"
                    );
                    return Err(TokenError::GateTimeout {
                        attempts: attempt,
                        worker_error: Some(err),
                    });
                }
                WorkerStatus::Stopped => {
                    tracing::warn!(
                        owner = %owner,
                        "Renewal worker is stopped and the access gate is closed"
                    );
                    return Err(TokenError::GateTimeout {
                        attempts: attempt,
                        worker_error: None,
                    });
                }
                WorkerStatus::Running | WorkerStatus::NotStarted => {
                    tracing::warn!(
                        owner = %owner,
                        attempt,
                        max_attempts,
                        timeout_secs = timeout.as_secs(),
                        "Timed out waiting for credential renewal to finish"
                    );
                }
            }
        }

        Err(TokenError::GateTimeout {
            attempts: max_attempts,
            worker_error: None,
        })
    }

    /// The credential for the owner resolved from the current context
    pub async fn current(&self) -> Result<CredentialEntry> {
        let owner = self.resolver.resolve();
        self.get(&owner).await
    }

    /// `Authorization` header value for `owner`
    pub async fn bearer_header(&self, owner: &str) -> Result<String> {
        let entry = self.get(owner).await?;
        Ok(format!("Bearer {}", entry.token()))
    }

    /// Replace the token for `owner` with one obtained out of band
    pub fn set_token(&self, owner: &str, token: &str) -> Result<()> {
        self.shared.map.set_token(owner, token)
    }

    /// Replace the expiry for `owner`
    pub fn set_expiry(&self, owner: &str, expires_at: i64) -> Result<()> {
        self.shared.map.set_expiry(owner, expires_at)
    }

    /// Run one sweep now instead of waiting for the schedule
    ///
    /// Behaves exactly like a scheduled sweep, including the renewal buffer,
    /// and does not require the background worker to be running. Dropping
    /// the returned future does not cancel the sweep; it still completes and
    /// reopens the gate.
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        run_sweep(&self.shared)
            .await
            .map_err(TokenError::WorkerFailed)
    }

    /// Request cooperative shutdown without waiting for the worker to exit
    pub fn signal_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Credential renewal worker shutdown requested");
            self.shutdown.cancel();
        }
    }

    /// Request shutdown and wait for the worker to exit
    ///
    /// An in-progress sweep finishes first; an idle worker exits immediately.
    pub async fn shutdown(&self) -> Result<()> {
        self.signal_shutdown();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle.await.map_err(|e| {
                TokenError::Lifecycle(format!("renewal worker task failed: {}", e))
            })?;
        }
        Ok(())
    }

    pub fn worker_status(&self) -> WorkerStatus {
        self.shared.status.lock().clone()
    }

    /// The gate guarding credential reads
    pub fn gate(&self) -> &AccessGate {
        &self.shared.gate
    }

    /// The underlying credential store
    pub fn credentials(&self) -> &CredentialMap {
        &self.shared.map
    }

    pub fn config(&self) -> &RenewalConfig {
        &self.shared.config
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("credentials", &self.shared.map.len())
            .field("gate", &self.shared.gate.state())
            .field("worker", &self.worker_status())
            .field("config", &self.shared.config)
            .finish()
    }
}
