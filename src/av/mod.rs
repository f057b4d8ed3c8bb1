//! Stream-level vocabulary shared by the codec framing and session layers:
//! codec identifiers, four-character codes, decoder format lookups, the
//! access unit that travels through the writer, and the stream descriptor.

mod format;
mod packet;
mod stream;
pub mod time;

pub use format::*;
pub use packet::*;
pub use stream::*;
