// src/esl/event.rs
//! Event socket frames and the call lifecycle events derived from them.

use crate::error::EslError;
use std::collections::HashMap;
use std::fmt;

pub const CHANNEL_CREATE: &str = "CHANNEL_CREATE";
pub const CHANNEL_ANSWER: &str = "CHANNEL_ANSWER";
pub const CHANNEL_HANGUP_COMPLETE: &str = "CHANNEL_HANGUP_COMPLETE";

pub const CONTENT_TYPE_AUTH: &str = "auth/request";
pub const CONTENT_TYPE_REPLY: &str = "command/reply";
pub const CONTENT_TYPE_EVENT_PLAIN: &str = "text/event-plain";
pub const CONTENT_TYPE_EVENT_JSON: &str = "text/event-json";
pub const CONTENT_TYPE_DISCONNECT: &str = "text/disconnect-notice";

/// A parsed event socket message: header lines plus an optional body.
///
/// The same type carries both the outer envelope read off the socket
/// (`Content-Type`, `Reply-Text`, ...) and the inner event it wraps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EslEvent {
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl EslEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `Name: value` header lines up to the first empty line; anything
    /// after it becomes the body. Header values are URL-decoded.
    pub fn parse(raw: &str) -> Self {
        let mut headers = HashMap::new();
        let mut body_lines = Vec::new();
        let mut in_body = false;

        for line in raw.lines() {
            if in_body {
                body_lines.push(line);
                continue;
            }

            if line.trim().is_empty() {
                if !headers.is_empty() {
                    in_body = true;
                }
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                let value = value.trim();
                let decoded = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                headers.insert(key.trim().to_string(), decoded);
            }
        }

        let body = if body_lines.is_empty() {
            None
        } else {
            Some(body_lines.join("\n"))
        };

        Self { headers, body }
    }

    /// Parse a `text/event-json` body. Non-string values are kept in their
    /// JSON text form; `_body` becomes the event body.
    pub fn parse_json(raw: &str) -> Result<Self, EslError> {
        let map: HashMap<String, serde_json::Value> = serde_json::from_str(raw)
            .map_err(|e| EslError::MalformedEvent(format!("invalid JSON event: {}", e)))?;

        let mut event = Self::new();
        for (key, value) in map {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            if key == "_body" {
                event.body = Some(value);
            } else {
                event.headers.insert(key, value);
            }
        }
        Ok(event)
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    /// Header value, treating an empty value the same as a missing header.
    pub fn non_empty_header(&self, name: &str) -> Option<&str> {
        self.get_header(name).filter(|v| !v.trim().is_empty())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
    }

    pub fn event_name(&self) -> Option<&str> {
        self.non_empty_header("Event-Name")
    }

    pub fn channel_unique_id(&self) -> Option<&str> {
        self.non_empty_header("Channel-Unique-ID")
    }

    pub fn caller_number(&self) -> Option<&str> {
        self.non_empty_header("Caller-Caller-ID-Number")
    }

    pub fn destination_number(&self) -> Option<&str> {
        self.non_empty_header("Caller-Destination-Number")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("Content-Type")
    }

    /// Body length announced by the frame, if any.
    pub fn content_length(&self) -> Result<Option<usize>, EslError> {
        match self.get_header("Content-Length") {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| EslError::Protocol(format!("invalid Content-Length: {:?}", raw))),
        }
    }

    pub fn reply_text(&self) -> Option<&str> {
        self.get_header("Reply-Text")
    }

    pub fn is_ok(&self) -> bool {
        self.reply_text()
            .map(|t| t.starts_with("+OK"))
            .unwrap_or(false)
    }
}

impl fmt::Display for EslEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EslEvent {{")?;

        if let Some(event_name) = self.event_name() {
            write!(f, " Event-Name: {}", event_name)?;
        }

        if let Some(uuid) = self.channel_unique_id() {
            write!(f, ", UUID: {}", uuid)?;
        }

        write!(f, ", Headers: {} }}", self.headers.len())
    }
}

/// The call lifecycle events the processor acts on. Every other event name
/// lands in `Unhandled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    ChannelCreate {
        unique_id: String,
        caller: Option<String>,
        destination: Option<String>,
    },
    ChannelAnswer {
        unique_id: String,
    },
    ChannelHangupComplete {
        unique_id: String,
    },
    Unhandled {
        event_name: String,
    },
}

impl CallEvent {
    /// Classify an event.
    ///
    /// Returns `Ok(None)` when the event carries no `Channel-Unique-ID` and
    /// so cannot be correlated to a call, and an error when it has no
    /// `Event-Name` at all.
    pub fn from_event(event: &EslEvent) -> Result<Option<Self>, EslError> {
        let event_name = event
            .event_name()
            .ok_or_else(|| EslError::MalformedEvent("missing Event-Name header".to_string()))?;

        let unique_id = match event.channel_unique_id() {
            Some(id) => id.to_string(),
            None => return Ok(None),
        };

        let call_event = match event_name {
            CHANNEL_CREATE => CallEvent::ChannelCreate {
                unique_id,
                caller: event.caller_number().map(str::to_string),
                destination: event.destination_number().map(str::to_string),
            },
            CHANNEL_ANSWER => CallEvent::ChannelAnswer { unique_id },
            CHANNEL_HANGUP_COMPLETE => CallEvent::ChannelHangupComplete { unique_id },
            other => CallEvent::Unhandled {
                event_name: other.to_string(),
            },
        };

        Ok(Some(call_event))
    }
}
