/// Credential lifecycle module
///
/// Stores per-owner short-lived credentials and keeps them fresh while
/// arbitrary concurrent callers use them.
///
/// ## Renewal Flow
///
/// 1. Callers register a token and its expiry under an owner key
/// 2. The renewal worker sleeps, then closes the access gate
/// 3. After a short grace period it renews every entry inside its renewal window
/// 4. Entries whose renewal fails are evicted
/// 5. The gate reopens and every blocked `get` sees the post-sweep state
pub mod client;
pub mod gate;
pub mod jwt;
pub mod manager;
pub mod map;
pub mod owner;
pub mod renewal;
pub mod types;

pub use client::{HttpRenewalClient, RenewFuture, RenewalClient};
pub use gate::{AccessGate, GateState};
pub use jwt::expiry_from_jwt;
pub use manager::{TokenManager, TokenManagerBuilder};
pub use map::CredentialMap;
pub use owner::{current_owner, scope_owner, DefaultOwner, OwnerResolver, TaskOwner, DEFAULT_OWNER};
pub use renewal::{SweepReport, WorkerStatus};
pub use types::{
    mask_token, ApiError, Clock, CredentialEntry, Result, SystemClock, TokenError, WorkerError,
};
