//! Crypto paper-trading bot and backtester.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. [`live`] runs the polling loops
//! and [`cli`] wires everything together.

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
pub mod live;
pub mod obs;
