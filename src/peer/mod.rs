//! Peer coordination: execution contexts and the blocking call surface.

pub mod connection;
pub mod threads;

pub use connection::Peer;
pub use threads::ThreadPair;
