//! tokenkeeper
//!
//! Short-lived credential management for processes that call an
//! authenticated HTTP API with tokens that expire and must be renewed while
//! concurrent callers keep using them.
//!
//! This crate provides:
//! - A per-owner in-memory credential store with atomic entry replacement
//! - A background renewal worker that renews credentials before they expire
//! - An access gate so no caller reads a credential mid-replacement
//! - An HTTP renewal client and TOML/environment configuration
//!
//! # Example
//!
//! ```no_run
//! use tokenkeeper::{HttpRenewalClient, RenewalConfig, TokenManager, DEFAULT_OWNER};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RenewalConfig::load("tokenkeeper.toml")?;
//! let client = HttpRenewalClient::from_config(&config)?;
//!
//! let manager = TokenManager::new(client, config)?;
//! manager.start()?;
//!
//! // Register the credential issued at login
//! manager.register(DEFAULT_OWNER, "eyJhbGci...", 1_900_000_000)?;
//!
//! // Every call picks up the latest renewed token
//! let credential = manager.get(DEFAULT_OWNER).await?;
//! println!("Using {}", credential);
//!
//! manager.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;

// Re-export commonly used types and functions
pub use config::RenewalConfig;
pub use credentials::{
    client::{HttpRenewalClient, RenewFuture, RenewalClient},
    gate::{AccessGate, GateState},
    jwt::expiry_from_jwt,
    manager::{TokenManager, TokenManagerBuilder},
    map::CredentialMap,
    owner::{current_owner, scope_owner, DefaultOwner, OwnerResolver, TaskOwner, DEFAULT_OWNER},
    renewal::{SweepReport, WorkerStatus},
    types::{
        mask_token, ApiError, Clock, CredentialEntry, Result, SystemClock, TokenError, WorkerError,
    },
};
