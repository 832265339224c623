//! The node process: config, the [`handle::Node`] object every other layer
//! is built around, the dispatcher that routes inbound envelopes to the
//! right component, and the server that owns the listening sockets.

pub mod config;
pub mod dispatcher;
pub mod handle;
pub mod server;

pub use config::NodeConfig;
pub use handle::Node;
