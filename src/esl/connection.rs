// src/esl/connection.rs
use crate::config::FreeSwitchServer;
use crate::error::EslError;
use crate::esl::codec::EslCodec;
use crate::esl::event::{
    EslEvent, CONTENT_TYPE_AUTH, CONTENT_TYPE_DISCONNECT, CONTENT_TYPE_EVENT_JSON,
    CONTENT_TYPE_EVENT_PLAIN, CONTENT_TYPE_REPLY,
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFormat {
    Plain,
    Json,
}

impl EventFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFormat::Plain => "plain",
            EventFormat::Json => "json",
        }
    }
}

impl fmt::Display for EventFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live, authenticated connection delivering switch events.
#[async_trait]
pub trait EventSource: Send {
    async fn subscribe(&mut self, format: EventFormat, scope: &str) -> Result<(), EslError>;

    /// Wait for the next frame. `Ok(None)` means a frame arrived that was
    /// not an event (command reply, log line) and carries nothing to do.
    async fn recv_event(&mut self) -> Result<Option<EslEvent>, EslError>;

    fn is_connected(&self) -> bool;

    async fn close(&mut self);
}

/// Opens new `EventSource`s; one call per supervisor cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn EventSource>, EslError>;

    fn server_id(&self) -> String;
}

pub struct EslConnection {
    framed: Framed<TcpStream, EslCodec>,
    server_id: String,
    connected: bool,
}

impl EslConnection {
    pub async fn connect(
        host: &str,
        port: u16,
        password: &str,
    ) -> Result<Self, EslError> {
        let server_id = format!("{}:{}", host, port);
        debug!("Opening TCP connection to {}", server_id);

        let stream = TcpStream::connect((host, port)).await?;
        let mut conn = Self {
            framed: Framed::new(stream, EslCodec::new()),
            server_id,
            connected: true,
        };

        let greeting = conn.next_frame().await?;
        if greeting.content_type() != Some(CONTENT_TYPE_AUTH) {
            return Err(EslError::InvalidGreeting(
                greeting.content_type().unwrap_or("<none>").to_string(),
            ));
        }

        debug!("Received auth request from {}", conn.server_id);

        conn.framed.send(format!("auth {}", password)).await?;
        let reply = conn.next_reply().await?;
        if !reply.is_ok() {
            return Err(EslError::AuthFailed(
                reply.reply_text().unwrap_or("no reply text").to_string(),
            ));
        }

        info!("Authenticated to FreeSWITCH: {}", conn.server_id);
        Ok(conn)
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    async fn next_frame(&mut self) -> Result<EslEvent, EslError> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => {
                self.connected = false;
                Err(e)
            }
            None => {
                self.connected = false;
                Err(EslError::ConnectionClosed)
            }
        }
    }

    // Events may arrive between a command and its reply; skip them.
    async fn next_reply(&mut self) -> Result<EslEvent, EslError> {
        loop {
            let frame = self.next_frame().await?;
            match frame.content_type() {
                Some(CONTENT_TYPE_REPLY) => return Ok(frame),
                Some(CONTENT_TYPE_DISCONNECT) => {
                    self.connected = false;
                    return Err(EslError::NotConnected);
                }
                _ => debug!("Skipping frame while waiting for command reply"),
            }
        }
    }
}

#[async_trait]
impl EventSource for EslConnection {
    async fn subscribe(&mut self, format: EventFormat, scope: &str) -> Result<(), EslError> {
        if !self.connected {
            return Err(EslError::NotConnected);
        }

        self.framed.send(format!("event {} {}", format, scope)).await?;
        let reply = self.next_reply().await?;
        if !reply.is_ok() {
            return Err(EslError::CommandFailed(
                reply.reply_text().unwrap_or("no reply text").to_string(),
            ));
        }

        info!("Subscribed to {} events ({}) on {}", scope, format, self.server_id);
        Ok(())
    }

    async fn recv_event(&mut self) -> Result<Option<EslEvent>, EslError> {
        if !self.connected {
            return Err(EslError::NotConnected);
        }

        let frame = self.next_frame().await?;
        match frame.content_type() {
            Some(CONTENT_TYPE_EVENT_PLAIN) => Ok(frame.body().map(EslEvent::parse)),
            Some(CONTENT_TYPE_EVENT_JSON) => match frame.body() {
                Some(body) => EslEvent::parse_json(body).map(Some),
                None => Ok(None),
            },
            Some(CONTENT_TYPE_DISCONNECT) => {
                warn!("FreeSWITCH sent disconnect notice: {}", self.server_id);
                self.connected = false;
                Err(EslError::NotConnected)
            }
            _ => Ok(None),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) {
        if self.connected {
            // Best effort; the peer may already be gone.
            let _ = self.framed.send("exit".to_string()).await;
        }
        self.connected = false;
        let _ = SinkExt::<String>::close(&mut self.framed).await;
        debug!("Closed connection to {}", self.server_id);
    }
}

/// Connects to one configured FreeSWITCH server.
#[derive(Debug, Clone)]
pub struct EslConnector {
    server: FreeSwitchServer,
    connect_timeout: Duration,
}

impl EslConnector {
    pub fn new(server: FreeSwitchServer, connect_timeout: Duration) -> Self {
        Self {
            server,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for EslConnector {
    async fn connect(&self) -> Result<Box<dyn EventSource>, EslError> {
        let connecting = EslConnection::connect(
            &self.server.host,
            self.server.port,
            &self.server.password,
        );

        match timeout(self.connect_timeout, connecting).await {
            Ok(Ok(conn)) => Ok(Box::new(conn)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EslError::ConnectTimeout(self.server.server_id())),
        }
    }

    fn server_id(&self) -> String {
        self.server.server_id()
    }
}
