//! Shared building blocks for the workspace crates: logging setup, wire types
//! used by the HTTP surface and the metrics encoder.

pub mod types;
pub mod metrics;

pub mod utils {
    pub mod logging;
}
