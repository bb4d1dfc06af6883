pub mod accessory;
pub mod coalescer;
pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod platform;
pub mod queue;
pub mod service;

#[cfg(test)]
mod testutil;
