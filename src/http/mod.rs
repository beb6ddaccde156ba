//! The Bastion HTTP Surface (spec.md §4.E, §6): a thin axum adapter over the
//! Alias Registry. Out of scope: TLS termination, connection limiting, ACL
//! middleware, request logging beyond `tower_http::trace::TraceLayer` — the
//! bastion binary is expected to sit behind whatever terminates TLS for the
//! deployment.

pub mod handlers;
pub mod server;

pub use server::{AppState, BastionServer};
