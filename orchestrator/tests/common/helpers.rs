//! Test helpers for building connections and orchestrators

use orchestrator::services::TokioClock;
use orchestrator::traits::{Bootstrapper, Clock, EventSink, TransportConnector};
use orchestrator::{AudioClip, Collaborators, Connection, ConnectionDeps, LoadOrchestrator, LoopbackBot};
use shared::{ConnectionEvent, ConnectionId, Settings};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::fixtures::TestFixtures;

/// Event sink that keeps everything it is given
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ConnectionEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<ConnectionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.name()).collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: ConnectionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Tokio clock that remembers every sleep it was asked to complete
#[derive(Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Clock for RecordingClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::time::sleep(duration).await;
    }
}

pub struct TestHelpers;

impl TestHelpers {
    pub fn deps(
        settings: Settings,
        bootstrapper: Arc<dyn Bootstrapper>,
        connector: Arc<dyn TransportConnector>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> ConnectionDeps {
        ConnectionDeps {
            settings: Arc::new(settings),
            bootstrapper,
            connector,
            clock,
            sink,
        }
    }

    /// A connection against `bot`, plus the sink its events land in
    pub fn loopback_connection(settings: Settings, bot: &LoopbackBot) -> (Connection, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let deps = Self::deps(
            settings,
            Arc::new(bot.clone()),
            Arc::new(bot.clone()),
            Arc::new(TokioClock),
            sink.clone(),
        );
        (Connection::new(ConnectionId::new(0), TestFixtures::HOST, deps), sink)
    }

    pub fn loopback_orchestrator(settings: Settings, bot: &LoopbackBot) -> LoadOrchestrator {
        let audio = Arc::new(AudioClip::from_settings(&settings).unwrap());
        LoadOrchestrator::new(
            Arc::new(settings),
            TestFixtures::HOST,
            Collaborators::loopback(bot.clone(), audio),
        )
    }

    /// Let spawned tasks drain their queues
    pub async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
