//! Numeric views of a screen snapshot

pub mod channels;
pub mod status;

pub use channels::{to_channel_grid, ChannelGrid, GlyphLayout, GlyphRange, CHANNELS};
pub use status::{to_status_record, StatusField, StatusRecord};
