//! Core types and trait definitions for the event-session history store.
//!
//! Has no database or runtime dependencies. The store backend and the
//! reconciliation engine both build on it.

// `SessionStore` uses native `async fn` in traits with explicit `Send` futures.
// Silence the advisory lint about `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod error;
pub mod session;
pub mod store;
pub mod version;

pub use error::{Error, Result};
