//! escrow-stepper - multi-step entity wizards for the escrow back-office console
//!
//! The [`wizard`] engine drives one data-entry session: step gating,
//! per-step persistence, deep-link URLs and hydration. [`flows`] describes
//! each entity's steps as data, [`api`] talks to the backend, and [`rest`]
//! is an in-memory stand-in for that backend.

pub mod api;
pub mod config;
pub mod flows;
pub mod logging;
pub mod rest;
pub mod runner;
pub mod wizard;
