//! Local broadcast channel.
//!
//! A Unix domain socket server that fans tagged temperature messages out
//! to every connected client process.

pub mod message;
pub mod server;

pub use message::{BroadcastMessage, MessageTag};
pub use server::{ClientId, IpcServer, ServerEvent};

/// Something that can deliver a message to every connected client.
#[cfg_attr(test, mockall::automock)]
pub trait BroadcastSink: Send + Sync {
    /// Deliver `message` to all current clients.
    ///
    /// Returns how many clients it was queued for. With no clients the
    /// message is dropped.
    fn broadcast(&self, message: &BroadcastMessage) -> usize;
}
