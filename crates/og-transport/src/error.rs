use thiserror::Error;

use crate::transport::ChannelId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),
    #[error("channel {0} is disconnected")]
    Disconnected(ChannelId),
}

pub type Result<T> = std::result::Result<T, TransportError>;
