//! Interface between the linker and the overlay network it runs on.
//!
//! - [`client::Network`]: the operations the linker consumes
//! - [`stream::Stream`]: newline-delimited record streams
//! - [`record::PeerRecord`]: the peer-list wire record

pub mod client;
pub mod config;
pub mod record;
pub mod stream;
