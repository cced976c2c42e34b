use std::{collections::HashMap, panic::AssertUnwindSafe, time::Duration};

use common::actors::{ShutdownSignal, wait_for_shutdown};
use futures_util::FutureExt;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::actors::{Actor, ActorType, ControlMessage};

pub type ActorFactory = Box<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

struct RunningActor {
    id: Uuid,
    handle: JoinHandle<()>,
    last_pulse: Instant,
}

pub struct Supervisor {
    actor_factories: HashMap<ActorType, ActorFactory>,
    running: HashMap<ActorType, RunningActor>,
    heartbeat_timeout: Duration,
    check_every: Duration,
    grace_period: Duration,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            actor_factories: HashMap::new(),
            running: HashMap::new(),
            heartbeat_timeout: Duration::from_secs(3),
            check_every: Duration::from_secs(1),
            grace_period: Duration::from_secs(75),
        }
    }

    pub fn with_timings(
        mut self,
        heartbeat_timeout: Duration,
        check_every: Duration,
        grace_period: Duration,
    ) -> Self {
        self.heartbeat_timeout = heartbeat_timeout;
        self.check_every = check_every;
        self.grace_period = grace_period;
        self
    }

    pub fn register_actor(&mut self, actor_type: ActorType, factory: ActorFactory) {
        self.actor_factories.insert(actor_type, factory);
    }

    /// Runs until `shutdown` flips, then gives actors the grace period to
    /// finish what they are doing before aborting them.
    pub async fn start(&mut self, mut shutdown: ShutdownSignal) {
        let mut check_interval = time::interval(self.check_every);
        let (supervisor_tx, mut supervisor_rx) = mpsc::channel::<ControlMessage>(512);

        let actors: Vec<ActorType> = self.actor_factories.keys().copied().collect();
        for actor in actors {
            self.spawn_actor(actor, supervisor_tx.clone());
        }

        loop {
            tokio::select! {
                Some(msg) = supervisor_rx.recv() => self.handle_message(msg),

                _ = check_interval.tick() => {
                    let dead_timeout = Instant::now() - self.heartbeat_timeout;

                    let dead_actors: Vec<ActorType> = self
                        .running
                        .iter()
                        .filter(|(_, running)| running.last_pulse < dead_timeout)
                        .map(|(actor_type, _)| *actor_type)
                        .collect();

                    for actor_type in dead_actors {
                        warn!("{:?} is unresponsive! Restarting.", actor_type);
                        if let Some(running) = self.running.remove(&actor_type) {
                            running.handle.abort();
                        }
                        self.spawn_actor(actor_type, supervisor_tx.clone());
                    }
                }

                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        // Nobody reads control messages past this point.
        drop(supervisor_rx);
        self.stop_all().await;
    }

    fn handle_message(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Heartbeat(actor_type, id) => {
                if let Some(running) = self.current(actor_type, id) {
                    running.last_pulse = Instant::now();
                }
            }
            ControlMessage::Shutdown(actor_type, id) => {
                if self.current(actor_type, id).is_some() {
                    info!("{:?} is shutting down gracefully.", actor_type);
                    self.running.remove(&actor_type);
                }
            }
            ControlMessage::Error(actor_type, error_msg) => {
                error!("Actor {:?} reported error: {}", actor_type, error_msg);
            }
        }
    }

    /// The running instance of `actor_type`, if `id` still belongs to it.
    /// Messages from replaced instances are ignored.
    fn current(&mut self, actor_type: ActorType, id: Uuid) -> Option<&mut RunningActor> {
        self.running
            .get_mut(&actor_type)
            .filter(|running| running.id == id)
    }

    async fn stop_all(&mut self) {
        info!(
            "Shutdown requested, waiting up to {}s for {} actor(s)",
            self.grace_period.as_secs(),
            self.running.len()
        );
        let deadline = Instant::now() + self.grace_period;

        for (actor_type, mut running) in self.running.drain() {
            match time::timeout_at(deadline, &mut running.handle).await {
                Ok(_) => info!("{:?} stopped", actor_type),
                Err(_) => {
                    warn!("{:?} did not stop within the grace period, aborting", actor_type);
                    running.handle.abort();
                }
            }
        }
    }

    fn spawn_actor(&mut self, actor_type: ActorType, tx: mpsc::Sender<ControlMessage>) {
        let Some(factory) = self.actor_factories.get(&actor_type) else {
            error!("No factory registered for {:?}", actor_type);
            return;
        };

        let mut new_actor = factory();
        let id = new_actor.id();
        // A crashed actor stops beating and is replaced on a later check.
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(new_actor.run(tx)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Actor {:?} crashed: {:#}", actor_type, e),
                Err(_) => error!("Actor {:?} panicked", actor_type),
            }
        });

        self.running.insert(
            actor_type,
            RunningActor {
                id,
                handle,
                last_pulse: Instant::now(),
            },
        );
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::actors::sleep_or_shutdown;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::sync::watch;

    struct CrashingActor {
        id: Uuid,
    }

    #[async_trait]
    impl Actor for CrashingActor {
        fn name(&self) -> ActorType {
            ActorType::Notifier
        }

        fn id(&self) -> Uuid {
            self.id
        }

        async fn run(&mut self, _tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    /// Starts beating like a real actor, then faults.
    struct FaultingActor {
        id: Uuid,
        panics: bool,
    }

    #[async_trait]
    impl Actor for FaultingActor {
        fn name(&self) -> ActorType {
            ActorType::TradingLoop
        }

        fn id(&self) -> Uuid {
            self.id
        }

        async fn run(&mut self, tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
            let _heartbeat = self.spawn_heartbeat(tx);
            time::sleep(Duration::from_millis(50)).await;
            if self.panics {
                panic!("cycle blew up");
            }
            anyhow::bail!("account feed gone")
        }
    }

    struct PoliteActor {
        id: Uuid,
        shutdown: ShutdownSignal,
    }

    #[async_trait]
    impl Actor for PoliteActor {
        fn name(&self) -> ActorType {
            ActorType::TradingLoop
        }

        fn id(&self) -> Uuid {
            self.id
        }

        async fn run(&mut self, tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
            let heartbeat = self.spawn_heartbeat(tx.clone());
            while !sleep_or_shutdown(Duration::from_millis(20), &mut self.shutdown).await {}
            heartbeat.abort();
            let _ = tx.send(ControlMessage::Shutdown(self.name(), self.id)).await;
            Ok(())
        }
    }

    fn fast(supervisor: Supervisor) -> Supervisor {
        supervisor.with_timings(
            Duration::from_millis(700),
            Duration::from_millis(50),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn restarts_actors_that_stop_beating() {
        let spawns = Arc::new(AtomicUsize::new(0));
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut supervisor = fast(Supervisor::new());
        let counter = spawns.clone();
        supervisor.register_actor(
            ActorType::Notifier,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::new(CrashingActor { id: Uuid::new_v4() })
            }),
        );

        let task = tokio::spawn(async move { supervisor.start(stop_rx).await });
        time::sleep(Duration::from_millis(1000)).await;
        stop_tx.send(true).unwrap();
        task.await.unwrap();

        assert!(spawns.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn healthy_actor_is_not_restarted_and_stops_on_shutdown() {
        let spawns = Arc::new(AtomicUsize::new(0));
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut supervisor = fast(Supervisor::new());
        let counter = spawns.clone();
        let actor_shutdown = stop_rx.clone();
        supervisor.register_actor(
            ActorType::TradingLoop,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::new(PoliteActor {
                    id: Uuid::new_v4(),
                    shutdown: actor_shutdown.clone(),
                })
            }),
        );

        let task = tokio::spawn(async move { supervisor.start(stop_rx).await });
        time::sleep(Duration::from_millis(1200)).await;
        stop_tx.send(true).unwrap();

        time::timeout(Duration::from_secs(1), task)
            .await
            .expect("supervisor should stop promptly")
            .unwrap();
        assert_eq!(spawns.load(Ordering::SeqCst), 1);
    }

    async fn spawns_of_faulting_actor(panics: bool) -> usize {
        let spawns = Arc::new(AtomicUsize::new(0));
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut supervisor = fast(Supervisor::new());
        let counter = spawns.clone();
        supervisor.register_actor(
            ActorType::TradingLoop,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::new(FaultingActor {
                    id: Uuid::new_v4(),
                    panics,
                })
            }),
        );

        let task = tokio::spawn(async move { supervisor.start(stop_rx).await });
        time::sleep(Duration::from_secs(3)).await;
        stop_tx.send(true).unwrap();
        task.await.unwrap();

        spawns.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn actor_that_panics_after_beating_is_restarted() {
        assert!(spawns_of_faulting_actor(true).await >= 2);
    }

    #[tokio::test]
    async fn actor_that_errors_after_beating_is_restarted() {
        assert!(spawns_of_faulting_actor(false).await >= 2);
    }
}
