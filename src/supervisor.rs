// src/supervisor.rs
use crate::config::Config;
use crate::esl::{Connector, EventFormat};
use crate::processor::{EventProcessor, ProcessorExit};
use crate::tracker::CallTracker;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MIN_LIVENESS_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub reconnect_delay: Duration,
    pub liveness_poll_interval: Duration,
    pub event_idle_timeout: Option<Duration>,
    pub stale_call_age: Duration,
    pub event_format: EventFormat,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            liveness_poll_interval: Duration::from_secs(1),
            event_idle_timeout: None,
            stale_call_age: Duration::from_secs(24 * 60 * 60),
            event_format: EventFormat::Plain,
        }
    }
}

impl From<&Config> for SupervisorConfig {
    fn from(config: &Config) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay,
            liveness_poll_interval: config.liveness_poll_interval,
            event_idle_timeout: config.event_idle_timeout,
            stale_call_age: config.stale_call_age,
            event_format: config.event_format,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    ConnectFailed,
    ProcessorExited,
    Shutdown,
}

/// Keeps one event processor attached to the switch, reconnecting after a
/// fixed delay whenever the connection or the processor goes away.
pub struct Supervisor<C: Connector> {
    connector: C,
    config: SupervisorConfig,
    tracker: CallTracker,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(connector: C, config: SupervisorConfig) -> Self {
        Self {
            connector,
            config,
            tracker: CallTracker::new(),
        }
    }

    pub fn tracker(&self) -> &CallTracker {
        &self.tracker
    }

    /// Retry forever. Only returns once `shutdown` is cancelled, handing
    /// back the calls still in progress.
    pub async fn run(mut self, shutdown: CancellationToken) -> CallTracker {
        let server_id = self.connector.server_id();
        info!(server = %server_id, "Starting FreeSWITCH connection supervisor");

        loop {
            if self.run_cycle(&shutdown).await == CycleOutcome::Shutdown {
                break;
            }

            tokio::select! {
                _ = sleep(self.config.reconnect_delay) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!(
            server = %server_id,
            active_calls = self.tracker.len(),
            "Connection supervisor stopped"
        );
        self.tracker
    }

    /// One connect, process, release round.
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) -> CycleOutcome {
        let server_id = self.connector.server_id();

        if let Ok(max_age) = chrono::Duration::from_std(self.config.stale_call_age) {
            for unique_id in self.tracker.evict_older_than(max_age, Utc::now()) {
                warn!(server = %server_id, "Dropping stale call {} (no hangup seen)", unique_id);
            }
        }

        info!(server = %server_id, "Attempting to connect to FreeSWITCH at {}...", server_id);

        let connecting = tokio::select! {
            result = self.connector.connect() => result,
            _ = shutdown.cancelled() => return CycleOutcome::Shutdown,
        };

        let mut source = match connecting {
            Ok(source) if source.is_connected() => source,
            Ok(mut source) => {
                source.close().await;
                error!(
                    server = %server_id,
                    "Connection failed. Retrying in {:?}...", self.config.reconnect_delay
                );
                return CycleOutcome::ConnectFailed;
            }
            Err(e) => {
                error!(
                    server = %server_id,
                    error_code = e.error_code(),
                    "Connection failed: {}. Retrying in {:?}...", e, self.config.reconnect_delay
                );
                return CycleOutcome::ConnectFailed;
            }
        };

        // Cancelled together with `shutdown`
        let cancel = shutdown.child_token();
        let mut processor = EventProcessor::new(server_id.clone(), std::mem::take(&mut self.tracker))
            .with_idle_timeout(self.config.event_idle_timeout)
            .with_event_format(self.config.event_format);

        let handle = tokio::spawn(async move {
            // A panic must not take the tracker down with the task
            let exit = AssertUnwindSafe(processor.run(source.as_mut(), &cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| ProcessorExit::Panicked(panic_message(panic.as_ref())));
            source.close().await;
            (processor.into_tracker(), exit)
        });

        let mut liveness = interval(self.config.liveness_poll_interval.max(MIN_LIVENESS_POLL));
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while !handle.is_finished() {
            liveness.tick().await;
        }

        match handle.await {
            Ok((tracker, exit)) => {
                self.tracker = tracker;
                match exit {
                    ProcessorExit::Cancelled => debug!(server = %server_id, "Event processor cancelled"),
                    ProcessorExit::ConnectionLost(e) => {
                        debug!(server = %server_id, "Event processor exited: {}", e)
                    }
                    ProcessorExit::Panicked(message) => error!(
                        server = %server_id,
                        active_calls = self.tracker.len(),
                        "Event processor panicked: {}. Call state is kept.", message
                    ),
                }
            }
            Err(e) => {
                error!(
                    server = %server_id,
                    "Event processor task failed: {}. Call state has been reset.", e
                );
                self.tracker = CallTracker::new();
            }
        }

        info!(server = %server_id, "Released connection to {}", server_id);

        if shutdown.is_cancelled() {
            CycleOutcome::Shutdown
        } else {
            CycleOutcome::ProcessorExited
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
