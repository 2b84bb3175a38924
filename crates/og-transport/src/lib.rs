//! `og-transport` - Data handoff channels between per-device workers.
//!
//! This crate provides:
//! - A `Transport` trait: create single-producer/single-consumer channels and
//!   move tensor values through them
//! - A reference `InProcessTransport` built on `crossbeam` channels, for
//!   workers running as threads of one process

pub mod error;
pub mod in_process;
pub mod transport;

pub use error::{Result, TransportError};
pub use in_process::InProcessTransport;
pub use transport::{ChannelId, Transport};
