//! Backend API client
//!
//! - [`BackendClient`]: reqwest client implementing the wizard's persistence,
//!   hydration and workflow seams
//! - [`RemoteValidator`]: server-side step validation
//! - [`ApiError`]: HTTP failures, mapped onto [`GatewayError`](crate::wizard::GatewayError)

pub mod client;
pub mod error;

pub use client::{BackendClient, RemoteValidator};
pub use error::ApiError;
