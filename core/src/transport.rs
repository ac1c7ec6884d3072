//! Transport contract between the server and its endpoints.
//!
//! The protocol assumes an ordered, reliable, already-connected channel
//! carrying opaque text in both directions. This module specifies only the
//! contract plus an in-memory implementation used by tests and the CLI
//! harness; real network transports live outside the engine.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};

/// Error raised when a message cannot be delivered.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer endpoint is gone; no further delivery is possible.
    #[error("channel closed by peer")]
    Closed,
}

/// Server-side view of one connected endpoint.
///
/// Implementations must deliver sent messages in order or fail with
/// [`TransportError::Closed`]; there is no partial delivery and no retry.
pub trait MessageSink {
    /// Sends one opaque text message to the peer.
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Unilaterally closes the channel; subsequent sends fail.
    fn close(&mut self);
}

/// One half of an in-memory duplex channel.
#[derive(Debug)]
pub struct ChannelEndpoint {
    outgoing: Sender<String>,
    incoming: Receiver<String>,
    open: bool,
}

impl ChannelEndpoint {
    /// Receives the next pending message, if one is queued.
    #[must_use]
    pub fn try_recv(&self) -> Option<String> {
        match self.incoming.try_recv() {
            Ok(text) => Some(text),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drains every pending message in arrival order.
    #[must_use]
    pub fn drain(&self) -> Vec<String> {
        let mut messages = Vec::new();
        while let Some(text) = self.try_recv() {
            messages.push(text);
        }
        messages
    }

    /// Reports whether this half has been closed locally.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }
}

impl MessageSink for ChannelEndpoint {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.outgoing
            .send(text.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Creates a connected pair of in-memory endpoints.
///
/// Messages sent on one half arrive on the other in order. Dropping either
/// half makes the peer's sends fail with [`TransportError::Closed`].
#[must_use]
pub fn channel_pair() -> (ChannelEndpoint, ChannelEndpoint) {
    let (left_tx, right_rx) = channel();
    let (right_tx, left_rx) = channel();
    (
        ChannelEndpoint {
            outgoing: left_tx,
            incoming: left_rx,
            open: true,
        },
        ChannelEndpoint {
            outgoing: right_tx,
            incoming: right_rx,
            open: true,
        },
    )
}
