//! Request/response snapshots and the network transport behind the worker.

mod client;
#[cfg(test)]
pub mod mock;
mod types;

pub use client::{HttpNetwork, Network};
pub use types::{Request, Response};
