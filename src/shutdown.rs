//! Cancellation signal shared by a server or client and its tasks.

use tokio::sync::watch;

/// Fires the signal. Dropping the trigger also releases every `fired()` waiter.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observes the signal; cheap to clone into every task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    /// A new observer of this trigger.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// `true` when the trigger fired after this observer was created, even
    /// if it had already fired before.
    pub fn fired_since_created(&self) -> bool {
        matches!(self.rx.has_changed(), Ok(true))
    }

    /// Resolves once the signal has fired (immediately if it already has).
    pub async fn fired(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fire_wakes_every_observer() {
        let (trigger, shutdown) = channel();
        let mut a = shutdown.clone();
        let mut b = shutdown;
        assert!(!a.is_fired());

        trigger.fire();

        a.fired().await;
        b.fired().await;
        assert!(a.is_fired());
    }

    #[test]
    fn fresh_observer_ignores_earlier_fire() {
        let (trigger, _) = channel();
        trigger.fire();

        let observer = trigger.subscribe();
        assert!(observer.is_fired());
        assert!(!observer.fired_since_created());

        trigger.fire();
        assert!(observer.fired_since_created());
    }

    #[tokio::test]
    async fn dropped_trigger_releases_waiters() {
        let (trigger, mut shutdown) = channel();
        drop(trigger);

        shutdown.fired().await;
        assert!(!shutdown.is_fired());
    }
}
