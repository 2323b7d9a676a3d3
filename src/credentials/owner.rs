//! Owner key resolution
//!
//! The manager never inspects ambient thread or task identity on its own.
//! Callers pick a strategy: a fixed default key, a closure, or [`TaskOwner`],
//! which reads a key scoped onto the current task with [`scope_owner`].

use std::future::Future;

/// Owner key used when nothing more specific is known
pub const DEFAULT_OWNER: &str = "default";

/// Resolves the owner key for the current execution context
pub trait OwnerResolver: Send + Sync {
    fn resolve(&self) -> String;
}

impl<F> OwnerResolver for F
where
    F: Fn() -> String + Send + Sync,
{
    fn resolve(&self) -> String {
        self()
    }
}

/// Always resolves to [`DEFAULT_OWNER`]
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultOwner;

impl OwnerResolver for DefaultOwner {
    fn resolve(&self) -> String {
        DEFAULT_OWNER.to_string()
    }
}

tokio::task_local! {
    static TASK_OWNER: String;
}

/// Resolves to the key set by the enclosing [`scope_owner`], or [`DEFAULT_OWNER`]
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskOwner;

impl OwnerResolver for TaskOwner {
    fn resolve(&self) -> String {
        current_owner().unwrap_or_else(|| DEFAULT_OWNER.to_string())
    }
}

/// Run `future` with `owner` as its task-scoped owner key
///
/// # Example
///
/// ```no_run
/// use tokenkeeper::{scope_owner, current_owner};
///
/// # async fn example() {
/// scope_owner("session-42", async {
///     assert_eq!(current_owner().as_deref(), Some("session-42"));
/// })
/// .await;
/// # }
/// ```
pub async fn scope_owner<F>(owner: impl Into<String>, future: F) -> F::Output
where
    F: Future,
{
    TASK_OWNER.scope(owner.into(), future).await
}

/// The owner key scoped onto the current task, if any
pub fn current_owner() -> Option<String> {
    TASK_OWNER.try_with(|owner| owner.clone()).ok()
}
