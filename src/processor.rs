// src/processor.rs
//! Turns the raw event stream of one connection into call tracker updates
//! and call log lines.

use crate::error::EslError;
use crate::esl::{CallEvent, EslEvent, EventFormat, EventSource};
use crate::tracker::{CallRecord, CallTracker};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// One line of the call log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallLogEntry {
    Initiated {
        unique_id: String,
        from: Option<String>,
        to: String,
    },
    Answered {
        unique_id: String,
    },
    Ended {
        unique_id: String,
    },
}

impl fmt::Display for CallLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallLogEntry::Initiated { unique_id, from, to } => write!(
                f,
                "Call Initiated: {} | From: {} | To: {}",
                unique_id,
                from.as_deref().unwrap_or("unknown"),
                to
            ),
            CallLogEntry::Answered { unique_id } => write!(f, "Call Answered: {}", unique_id),
            CallLogEntry::Ended { unique_id } => write!(f, "Call Ended: {}", unique_id),
        }
    }
}

/// Why a processor stopped.
#[derive(Debug)]
pub enum ProcessorExit {
    Cancelled,
    ConnectionLost(EslError),
    /// The processor panicked; carries the panic message.
    Panicked(String),
}

pub struct EventProcessor {
    server_id: String,
    tracker: CallTracker,
    idle_timeout: Option<Duration>,
    event_format: EventFormat,
}

impl EventProcessor {
    pub fn new(server_id: impl Into<String>, tracker: CallTracker) -> Self {
        Self {
            server_id: server_id.into(),
            tracker,
            idle_timeout: None,
            event_format: EventFormat::Plain,
        }
    }

    pub fn with_event_format(mut self, event_format: EventFormat) -> Self {
        self.event_format = event_format;
        self
    }

    /// Treat a silent connection as lost after `idle_timeout`.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn tracker(&self) -> &CallTracker {
        &self.tracker
    }

    pub fn into_tracker(self) -> CallTracker {
        self.tracker
    }

    /// Subscribe to every event and process them until the connection
    /// becomes unusable or `cancel` fires.
    ///
    /// Errors confined to a single event are logged and the loop carries on;
    /// connection-level errors end it.
    pub async fn run(
        &mut self,
        source: &mut dyn EventSource,
        cancel: &CancellationToken,
    ) -> ProcessorExit {
        if let Err(e) = source.subscribe(self.event_format, "all").await {
            error!(server = %self.server_id, "Failed to subscribe to events: {}", e);
            return ProcessorExit::ConnectionLost(e);
        }

        info!(
            server = %self.server_id,
            "Successfully connected to FreeSWITCH ESL and subscribed to events."
        );

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(server = %self.server_id, "Event processor cancelled");
                    return ProcessorExit::Cancelled;
                }
                received = receive(source, self.idle_timeout) => received,
            };

            match received {
                Ok(Some(event)) => match self.handle_event(&event) {
                    // Call log lines go out bare
                    Ok(Some(entry)) => info!("{}", entry),
                    Ok(None) => {}
                    Err(e) => error!(
                        server = %self.server_id,
                        event = %event,
                        "An unexpected error occurred in event processor: {}", e
                    ),
                },
                Ok(None) => continue,
                Err(e) if e.is_connection_fatal() => {
                    error!(
                        server = %self.server_id,
                        error_code = e.error_code(),
                        "Lost connection to FreeSWITCH ESL: {}. Exiting event processor.", e
                    );
                    return ProcessorExit::ConnectionLost(e);
                }
                Err(e) => error!(
                    server = %self.server_id,
                    "An unexpected error occurred in event processor: {}", e
                ),
            }
        }
    }

    /// Apply one event to the tracker, returning the log entry it produced.
    pub fn handle_event(&mut self, event: &EslEvent) -> Result<Option<CallLogEntry>, EslError> {
        match CallEvent::from_event(event)? {
            Some(call_event) => Ok(self.apply(call_event, Utc::now())),
            None => Ok(None),
        }
    }

    pub fn apply(&mut self, event: CallEvent, now: DateTime<Utc>) -> Option<CallLogEntry> {
        match event {
            CallEvent::ChannelCreate {
                unique_id,
                caller,
                destination,
            } => {
                // Legs without a destination are not logged
                let to = destination?;
                let record = CallRecord::new(caller.clone(), to.clone(), now);
                if !self.tracker.start(&unique_id, record) {
                    return None;
                }
                Some(CallLogEntry::Initiated {
                    unique_id,
                    from: caller,
                    to,
                })
            }
            CallEvent::ChannelAnswer { unique_id } => {
                self.tracker.answer(&unique_id, now)?;
                Some(CallLogEntry::Answered { unique_id })
            }
            CallEvent::ChannelHangupComplete { unique_id } => {
                let record = self.tracker.end(&unique_id, now)?;
                debug!(
                    server = %self.server_id,
                    record = %serde_json::to_string(&record).unwrap_or_default(),
                    ring_secs = record.ring_duration().map(|d| d.num_seconds()),
                    talk_secs = record.talk_duration().map(|d| d.num_seconds()),
                    "Closed call record {}", unique_id
                );
                Some(CallLogEntry::Ended { unique_id })
            }
            CallEvent::Unhandled { .. } => None,
        }
    }
}

async fn receive(
    source: &mut dyn EventSource,
    idle_timeout: Option<Duration>,
) -> Result<Option<EslEvent>, EslError> {
    match idle_timeout {
        Some(limit) => match timeout(limit, source.recv_event()).await {
            Ok(received) => received,
            Err(_) => Err(EslError::IdleTimeout(limit.as_secs())),
        },
        None => source.recv_event().await,
    }
}
