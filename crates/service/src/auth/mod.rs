//! Auth module: signed claims, session-backed refresh tokens and their
//! persistence, split into domain, repository and service layers.

pub mod domain;
pub mod errors;
pub mod repository;
pub mod service;
pub mod token;
pub mod repo;

pub use service::TokenAuthority;
pub use token::{Claims, TokenKind};
