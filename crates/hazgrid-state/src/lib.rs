//! hazgrid-state — persistence for hazard↔grid interoperability records.
//!
//! Backed by [redb](https://docs.rs/redb). One composite-keyed table of
//! JSON-serialized records; prefix scans narrow lookups by site and
//! hazard type. The store is `Clone + Send + Sync` (backed by
//! `Arc<Database>`) and kept in a crate of its own so its transaction
//! scope stays independent of the hazard-event registry.
//!
//! Unlike a generic KV store, writes are probe-disciplined: `store` is
//! insert-only and `update` is replace-only, so a duplicate identity is
//! surfaced as a conflict instead of being silently overwritten.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::InteropRecordStore;
pub use types::InteropRecord;
