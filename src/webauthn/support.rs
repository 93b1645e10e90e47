use super::{Authenticator, Capabilities};
use std::{fmt::Debug, sync::Arc};
use tokio::sync::Mutex;
use tracing::info;

/// Capabilities moved from one state to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportChanged {
    /// The previous state, `None` on the first check.
    pub previous: Option<Capabilities>,
    /// The new state.
    pub current: Capabilities,
}

/// Receives [`SupportChanged`] events.
pub trait SupportObserver: Debug + Send + Sync {
    /// Called once per transition.
    fn on_support_changed(&self, event: SupportChanged);
}

/// Re-checks platform capabilities and notifies observers on transitions only.
#[derive(Debug)]
pub struct SupportMonitor<A> {
    authenticator: A,
    last: Mutex<Option<Capabilities>>,
    observers: Vec<Arc<dyn SupportObserver>>,
}

impl<A: Authenticator> SupportMonitor<A> {
    /// Creates a monitor that has not checked yet.
    pub fn new(authenticator: A) -> Self {
        Self { authenticator, last: Mutex::new(None), observers: Vec::new() }
    }

    /// Adds an observer.
    pub fn with_observer(mut self, observer: Arc<dyn SupportObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Returns the last observed state.
    pub async fn last(&self) -> Option<Capabilities> {
        *self.last.lock().await
    }

    /// Checks capabilities, notifying observers if they changed.
    pub async fn refresh(&self) -> Capabilities {
        let mut last = self.last.lock().await;
        let current = self.authenticator.check_support().await;

        if *last != Some(current) {
            let event = SupportChanged { previous: *last, current };
            info!(
                supported = current.is_supported(),
                secure_enclave = current.secure_enclave,
                "WebAuthn support changed"
            );
            for observer in &self.observers {
                observer.on_support_changed(event);
            }
            *last = Some(current);
        }

        current
    }
}
