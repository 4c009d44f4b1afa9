//! Connection and screen layer.
//!
//! - **term**: VT terminal state and escape sequence parser
//! - **telnet**: telnet option refusal and IAC framing
//! - **transport**: byte-stream seam to the server (TCP, or fakes in tests)
//! - **retry**: reconnect backoff policy
//! - **transcript**: recorded send/receive history
//! - **session**: one login, combining transport + terminal + prompt flags
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── Transport (telnet over TCP)
//! ├── Terminal
//! │   ├── Screen (cell grid + glyph ids + cursor)
//! │   └── VtParser (escape sequences, tile data)
//! └── Transcript (optional)
//! ```

pub mod retry;
pub mod session;
pub mod telnet;
pub mod term;
pub mod transcript;
pub mod transport;
