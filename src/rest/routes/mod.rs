//! Route handlers for the sandbox API.

pub mod entities;
pub mod flows;
pub mod health;
pub mod workflow;
