#![doc = include_str!("../README.md")]

pub mod bus;
pub mod connectors;
pub mod crypto;
pub mod error;
pub mod gossip;
pub mod http;
pub mod identity;
pub mod negotiation;
pub mod node;
pub mod orderbook;
pub mod peer;
pub mod protocol;
pub mod settlement;
mod utill;

pub use utill::setup_logger;
