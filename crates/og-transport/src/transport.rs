use std::fmt::{self, Debug};

use og_tensor::Tensor;

use crate::error::Result;

/// Opaque identity of one channel created by a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Trait for pluggable channel backends (in-process, cross-process, device-to-host).
///
/// A channel has exactly one producer and one consumer. Graph construction only
/// calls [`Transport::create_channel`]; `send` and `recv` are used by the
/// per-device workers at execution time.
pub trait Transport: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "in-process").
    fn name(&self) -> &str;

    /// Allocate a new channel and return its identity.
    fn create_channel(&self) -> ChannelId;

    /// Hand `value` to the consumer of `channel`.
    fn send(&self, channel: ChannelId, value: Tensor) -> Result<()>;

    /// Block until a value is available on `channel` and take it.
    fn recv(&self, channel: ChannelId) -> Result<Tensor>;

    /// Stop accepting values on `channel`. Values already sent stay
    /// receivable; after that `recv` fails with `Disconnected`. Closing twice
    /// is not an error.
    fn close(&self, channel: ChannelId) -> Result<()>;
}
