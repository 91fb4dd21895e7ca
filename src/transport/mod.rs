//! Publish/subscribe link to the remote broker.
//!
//! The door core sees the network only through [`TransportBridge`]. Inbound
//! traffic is not delivered by callback: the loop calls
//! [`TransportBridge::service`] once per iteration and handles the returned
//! [`TransportEvent`]s itself, so all door state is mutated from the loop.

pub mod mqtt;

pub use mqtt::MqttBridge;

use thiserror::Error;

/// Message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

/// Something the session reported since the last service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A broker session was (re)established. Subscriptions must be renewed.
    SessionEstablished,
    /// The broker session was lost.
    SessionLost,
    Message(InboundMessage),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker session is down")]
    SessionDown,

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
}

/// External publish/subscribe endpoint driven by the polling loop.
///
/// Every method must return promptly; the loop calls them on each iteration.
pub trait TransportBridge {
    /// Drain everything the session received since the previous call.
    fn service(&mut self) -> Vec<TransportEvent>;

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), TransportError>;

    /// Network path to the broker is up.
    fn is_link_up(&self) -> bool;

    /// Broker session is established.
    fn is_session_up(&self) -> bool;
}
