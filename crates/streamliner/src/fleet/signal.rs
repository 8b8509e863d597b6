//! Per-device completion signal
//!
//! A resettable binary event: the worker sets it after sending a reply, the
//! dispatcher waits on it and clears it when releasing the device.

use tokio::sync::watch;

pub struct CompletionSignal {
    state: watch::Sender<bool>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state }
    }

    pub fn set(&self) {
        self.state.send_replace(true);
    }

    pub fn clear(&self) {
        self.state.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolve once the signal is set; returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_set() {
        let signal = Arc::new(CompletionSignal::new());
        let setter = Arc::clone(&signal);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            setter.set();
        });

        tokio::time::timeout(Duration::from_secs(5), signal.wait())
            .await
            .expect("signal never observed");
        assert!(signal.is_set());
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_clear_resets() {
        let signal = CompletionSignal::new();
        signal.set();
        signal.wait().await;
        signal.clear();
        assert!(!signal.is_set());
        assert!(tokio::time::timeout(Duration::from_millis(30), signal.wait())
            .await
            .is_err());
    }
}
