use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crossbeam::channel::{self, Receiver, Sender};
use og_tensor::Tensor;

use crate::error::{Result, TransportError};
use crate::transport::{ChannelId, Transport};

/// In-process channel backend for workers running as threads.
///
/// Each channel is a `crossbeam` channel; the transport keeps both ends and
/// hands them out by [`ChannelId`]. Channels are unbounded unless a capacity
/// is configured, in which case a send blocks while the channel is full.
///
/// Closing a channel drops the transport's sender. Values already sent can
/// still be received; once the channel is empty, `recv` reports it
/// disconnected and the transport forgets it.
#[derive(Debug)]
pub struct InProcessTransport {
    capacity: Option<usize>,
    next_id: AtomicU64,
    channels: Mutex<HashMap<ChannelId, Endpoints>>,
}

#[derive(Debug)]
struct Endpoints {
    /// `None` once the channel is closed.
    tx: Option<Sender<Tensor>>,
    rx: Receiver<Tensor>,
}

impl InProcessTransport {
    /// Transport whose channels never block the sender.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// Transport whose channels hold at most `capacity` values in flight.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            next_id: AtomicU64::new(0),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Number of channels created and not yet closed and drained.
    pub fn channel_count(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn sender(&self, id: ChannelId) -> Result<Sender<Tensor>> {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let ends = channels.get(&id).ok_or(TransportError::UnknownChannel(id))?;
        ends.tx.clone().ok_or(TransportError::Disconnected(id))
    }

    fn receiver(&self, id: ChannelId) -> Result<Receiver<Tensor>> {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .get(&id)
            .map(|ends| ends.rx.clone())
            .ok_or(TransportError::UnknownChannel(id))
    }
}

impl Default for InProcessTransport {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Transport for InProcessTransport {
    fn name(&self) -> &str {
        "in-process"
    }

    fn create_channel(&self) -> ChannelId {
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = match self.capacity {
            Some(cap) => channel::bounded(cap),
            None => channel::unbounded(),
        };
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Endpoints { tx: Some(tx), rx });
        tracing::trace!(channel = %id, "created in-process channel");
        id
    }

    fn send(&self, channel: ChannelId, value: Tensor) -> Result<()> {
        // Clone the end out so the map lock is not held while blocking.
        let tx = self.sender(channel)?;
        tracing::trace!(%channel, axes = %value.axes(), "send");
        tx.send(value)
            .map_err(|_| TransportError::Disconnected(channel))
    }

    fn recv(&self, channel: ChannelId) -> Result<Tensor> {
        let rx = self.receiver(channel)?;
        match rx.recv() {
            Ok(value) => {
                tracing::trace!(%channel, axes = %value.axes(), "recv");
                Ok(value)
            }
            Err(_) => {
                // Closed and drained.
                self.channels
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&channel);
                tracing::trace!(%channel, "released in-process channel");
                Err(TransportError::Disconnected(channel))
            }
        }
    }

    fn close(&self, channel: ChannelId) -> Result<()> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let ends = channels
            .get_mut(&channel)
            .ok_or(TransportError::UnknownChannel(channel))?;
        if ends.tx.take().is_some() {
            tracing::trace!(%channel, "closed in-process channel");
        }
        Ok(())
    }
}
