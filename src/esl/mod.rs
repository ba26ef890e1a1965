// src/esl/mod.rs
pub mod codec;
pub mod connection;
pub mod event;

pub use codec::EslCodec;
pub use connection::{Connector, EslConnection, EslConnector, EventFormat, EventSource};
pub use event::{CallEvent, EslEvent};

#[cfg(test)]
pub use connection::MockConnector;
