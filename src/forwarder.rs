//! Event forwarder.
//!
//! Turns each reading from a ready peripheral into an object and an
//! ambient temperature message and hands both to the broadcast sink.
//! Delivery is at most once: nothing is queued for clients that are not
//! connected yet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::data::Reading;
use crate::ipc::{BroadcastMessage, BroadcastSink};
use crate::peripheral::{PeripheralEvent, SensorPeripheral};

/// Handle for a registered reading callback.
///
/// The callback stops when the handle is unregistered or dropped.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

/// Republishes readings to the broadcast sink.
pub struct EventForwarder {
    sink: Arc<dyn BroadcastSink>,
    callback_counter: AtomicU64,
}

impl EventForwarder {
    /// Create a forwarder that publishes through `sink`.
    pub fn new(sink: Arc<dyn BroadcastSink>) -> Self {
        Self {
            sink,
            callback_counter: AtomicU64::new(0),
        }
    }

    /// Forward one reading as two messages.
    ///
    /// Returns the number of clients that received the pair.
    pub fn forward(&self, reading: &Reading) -> usize {
        let [object, ambient] = BroadcastMessage::from_reading(reading);

        info!("object temperature = {} °C", object.payload);
        info!("ambient temperature = {} °C", ambient.payload);

        let delivered = self.sink.broadcast(&object);
        self.sink.broadcast(&ambient);

        if delivered == 0 {
            debug!("No clients connected, reading dropped");
        }

        delivered
    }

    /// Register the forwarding callback on a peripheral.
    ///
    /// Every reading the peripheral emits after this call is forwarded
    /// until the peripheral disconnects or the returned handle is dropped.
    pub fn attach(self: &Arc<Self>, peripheral: &dyn SensorPeripheral) -> CallbackHandle {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = peripheral.subscribe();
        let forwarder = Arc::clone(self);
        let peripheral_id = peripheral.id();

        let handle = tokio::spawn(async move {
            debug!("Reading callback {} attached to {}", callback_id, peripheral_id);
            loop {
                match rx.recv().await {
                    Ok(PeripheralEvent::Reading(reading)) => {
                        forwarder.forward(&reading);
                    }
                    Ok(PeripheralEvent::Disconnected) | Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Reading callback lagged, {} readings skipped", skipped);
                    }
                }
            }
            debug!("Reading callback {} detached", callback_id);
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }
}
