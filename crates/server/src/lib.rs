//! HTTP surface: resolves the tenant per request, authenticates bearer
//! tokens and exposes a handful of tenant and session endpoints.

pub mod errors;
pub mod middleware;
pub mod routes;
pub mod startup;

pub use startup::{run, AppState, Backends};
