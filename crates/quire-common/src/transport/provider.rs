//! Transport provider contract.
//!
//! The editor core never talks to a network directly. Each open document owns
//! one provider; the registry drains provider events from its event loop and
//! hands outbound messages back as a non-blocking enqueue.

use miette::Diagnostic;
use smol_str::SmolStr;

use super::messages::CollabMessage;

/// Error type for transport operations
#[derive(Debug, Clone, PartialEq, thiserror::Error, Diagnostic)]
pub enum TransportError {
    #[error("relay unreachable: {0}")]
    #[diagnostic(
        code(quire::transport::unreachable),
        help("the document stays editable offline and resyncs on reconnect")
    )]
    Unreachable(SmolStr),

    #[error("connection lost")]
    #[diagnostic(code(quire::transport::connection_lost))]
    ConnectionLost,

    #[error("connection rejected: {0}")]
    #[diagnostic(code(quire::transport::rejected))]
    Rejected(SmolStr),

    #[error("malformed frame: {0}")]
    #[diagnostic(code(quire::transport::decode))]
    Decode(SmolStr),
}

/// Lifecycle and data events surfaced by a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// The connection is established.
    Open,
    /// The provider has delivered everything the relay had for us.
    Synced,
    /// The connection closed (graceful or forced).
    Close,
    Error(TransportError),
    Message(CollabMessage),
}

/// One connection to the relay for one document.
pub trait TransportProvider {
    /// Start connecting. Progress arrives as [`ProviderEvent`]s.
    fn connect(&mut self, document_id: &str, auth_token: Option<&str>);

    /// Enqueue a message for the other replicas. Never blocks; messages sent
    /// while disconnected are dropped.
    fn send(&mut self, message: CollabMessage);

    /// Next pending event, if any.
    fn try_next_event(&mut self) -> Option<ProviderEvent>;

    /// Tear the connection down. No events are delivered afterwards.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

/// Creates providers for newly opened documents.
pub trait TransportFactory {
    fn create(&self) -> Box<dyn TransportProvider>;
}
