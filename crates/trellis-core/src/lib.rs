//! Core types and services for the Trellis relationship-and-activity engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. Storage
//! backends implement the traits in [`store`]; entity-owning subsystems plug
//! in through the [`registry`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod activity;
pub mod clock;
pub mod entity;
pub mod error;
pub mod feed;
pub mod hydrate;
pub mod registry;
pub mod relation;
pub mod store;
pub mod toggle;

pub use error::{Error, Result};

#[cfg(test)]
mod testing;
