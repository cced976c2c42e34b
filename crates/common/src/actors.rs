use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorType {
    TradingLoop,
    OperatorConsole,
    Notifier,
}

/// Messages sent from Actors to the Supervisor
pub enum ControlMessage {
    Heartbeat(ActorType, Uuid),
    Shutdown(ActorType, Uuid),
    Error(ActorType, String),
}

impl std::fmt::Debug for ControlMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heartbeat(actor_type, id) => write!(f, "Heartbeat({:?}, {})", actor_type, id),
            Self::Shutdown(actor_type, id) => write!(f, "Shutdown({:?}, {})", actor_type, id),
            Self::Error(actor_type, err) => write!(f, "Error({:?}, {})", actor_type, err),
        }
    }
}

/// Process-wide stop signal. `true` once shutdown was requested.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Resolves once the shutdown flag flips to `true` (or the sender is gone).
pub async fn wait_for_shutdown(shutdown: &mut ShutdownSignal) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sleeps for `duration` unless shutdown is requested first.
/// Returns `true` when the sleep was interrupted by shutdown.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut ShutdownSignal) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = wait_for_shutdown(shutdown) => true,
    }
}

/// The trait that all restartable services must implement
#[async_trait]
pub trait Actor: Send + Sync {
    fn name(&self) -> ActorType;

    fn id(&self) -> Uuid;

    /// The main loop of the actor.
    /// Heartbeats are emitted by `spawn_heartbeat` while `run` is alive.
    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()>;

    /// Keep the returned guard alive for as long as `run` works. It stops the
    /// pulses when dropped, so an early return or a panic goes silent and the
    /// supervisor restarts the actor.
    fn spawn_heartbeat(&self, supervisor_tx: mpsc::Sender<ControlMessage>) -> HeartbeatGuard {
        let id = self.id();
        let name = self.name();
        HeartbeatGuard(tokio::spawn(async move {
            loop {
                if supervisor_tx
                    .send(ControlMessage::Heartbeat(name, id))
                    .await
                    .is_err()
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }))
    }
}

/// Handle of a heartbeat task; aborts the task when dropped.
#[must_use = "the heartbeat stops as soon as the guard is dropped"]
pub struct HeartbeatGuard(JoinHandle<()>);

impl HeartbeatGuard {
    pub fn abort(self) {
        drop(self);
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_is_cut_short_by_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            sleep_or_shutdown(Duration::from_secs(3600), &mut rx).await
        });
        tx.send(true).unwrap();
        assert!(handle.await.unwrap());
    }

    struct Beating(Uuid);

    #[async_trait]
    impl Actor for Beating {
        fn name(&self) -> ActorType {
            ActorType::Notifier
        }

        fn id(&self) -> Uuid {
            self.0
        }

        async fn run(&mut self, _tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn dropping_the_guard_stops_the_pulses() {
        let (tx, mut rx) = mpsc::channel(16);
        let guard = Beating(Uuid::new_v4()).spawn_heartbeat(tx);
        assert!(matches!(rx.recv().await, Some(ControlMessage::Heartbeat(..))));

        drop(guard);
        // The task held the only sender; once aborted the channel closes.
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[tokio::test]
    async fn sleep_completes_without_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(!sleep_or_shutdown(Duration::from_millis(5), &mut rx).await);
    }
}
