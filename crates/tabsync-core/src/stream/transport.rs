//! Push transport seam.
//!
//! The controller never reads from a connection. The host delivers each
//! connection's signals back through `StreamController::handle`, tagged
//! with the [`ConnectionId`] it was opened with.

use super::model::ConnectionId;
use crate::error::TransportError;

/// One open push connection.
pub trait Transport: Send {
    /// Tear the connection down. No further signals for it are expected.
    fn close(&mut self);
}

/// Opens push connections.
pub trait TransportFactory: Send {
    /// `false` when the host has no such transport at all.
    fn is_supported(&self) -> bool {
        true
    }

    fn connect(&mut self, id: ConnectionId, url: &str)
        -> Result<Box<dyn Transport>, TransportError>;
}
