//! Server-Sent-Events decoding for the generation stream
//!
//! The server frames each event as
//!
//! ```text
//! event: <type>
//! data: <json>
//! <blank line>
//! ```
//!
//! with `\n` or `\r\n` line endings. [`StreamDecoder`] turns arbitrary byte
//! chunks into [`Frame`]s, [`decode`] turns a frame into a [`DecodedEvent`],
//! and [`decode_stream`] wires both onto an async byte stream.

mod decoder;
mod event;
mod frame;
mod stream;

pub use decoder::StreamDecoder;
pub use event::{ApprovalOption, ApprovalRequest, DecodedEvent, decode};
pub use frame::{Frame, parse_frame};
pub use stream::decode_stream;
