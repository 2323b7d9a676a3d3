use std::time::Duration;
use tokio::sync::watch;

/// State of the [`AccessGate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Credential reads are permitted
    Open,
    /// A renewal sweep is in progress; reads wait
    Closed,
}

/// Binary gate guarding credential reads during a renewal sweep
///
/// Backed by a `watch` channel: every waiter holds its own receiver, so
/// [`AccessGate::open`] releases all of them at once rather than one at a time.
/// The gate starts open.
#[derive(Debug)]
pub struct AccessGate {
    state: watch::Sender<GateState>,
}

impl AccessGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::Open);
        Self { state }
    }

    /// Block new reads until [`AccessGate::open`] is called
    pub fn close(&self) {
        if self.state.send_replace(GateState::Closed) == GateState::Open {
            tracing::debug!("Access gate closed");
        }
    }

    /// Permit reads and wake every blocked waiter
    pub fn open(&self) {
        if self.state.send_replace(GateState::Open) == GateState::Closed {
            tracing::debug!(waiters = self.state.receiver_count(), "Access gate opened");
        }
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == GateState::Open
    }

    /// Wait until the gate is open, for at most `timeout`
    ///
    /// Returns `true` once the gate is open and `false` if the timeout
    /// elapsed first. Returns immediately when the gate is already open.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut state = self.state.subscribe();
        let opened = tokio::time::timeout(
            timeout,
            state.wait_for(|current| *current == GateState::Open),
        )
        .await;

        matches!(opened, Ok(Ok(_)))
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_gate_starts_open() {
        let gate = AccessGate::new();
        assert!(gate.is_open());
        assert_eq!(gate.state(), GateState::Open);
    }

    #[test]
    fn test_gate_transitions() {
        let gate = AccessGate::new();
        gate.close();
        assert_eq!(gate.state(), GateState::Closed);
        gate.close();
        assert_eq!(gate.state(), GateState::Closed);
        gate.open();
        assert!(gate.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_immediately_when_open() {
        let gate = AccessGate::new();
        let started = tokio::time::Instant::now();
        assert!(gate.wait(Duration::from_secs(10)).await);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_when_closed() {
        let gate = AccessGate::new();
        gate.close();

        let started = tokio::time::Instant::now();
        assert!(!gate.wait(Duration::from_secs(15)).await);
        assert!(started.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_releases_all_waiters() {
        let gate = Arc::new(AccessGate::new());
        gate.close();

        let waiters: Vec<_> = (0..10)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.wait(Duration::from_secs(60)).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(waiters.iter().all(|waiter| !waiter.is_finished()));

        gate.open();
        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
    }
}
