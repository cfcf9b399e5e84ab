//! Annotation channel client.
//!
//! Owns the persistent WebSocket push connection that carries detection
//! batches for one stream:
//!
//! - [`messages`] — typed parsing of the inbound JSON messages.
//! - [`client`] — connection setup and the shared connected/last-error
//!   status flags.
//! - [`processor`] — the receive loop that appends batches to the
//!   [`sightline_core::AnnotationBuffer`].
//! - [`reconnect`] — exponential-backoff retry pacing for the owning
//!   session's connection loop.

pub mod client;
pub mod messages;
pub mod processor;
pub mod reconnect;

pub use client::{ChannelClient, ChannelConnection, ChannelError, ChannelStatus};
pub use messages::{parse_message, BoxData, BoxBatchData, ChannelMessage};
pub use processor::{process_messages, ChannelEvent};
pub use reconnect::{Backoff, ReconnectConfig};
