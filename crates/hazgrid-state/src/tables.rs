//! redb table definitions for the interoperability record store.
//!
//! A single table holds all records, `&str` keys and `&[u8]` values
//! (JSON-serialized [`crate::InteropRecord`]s). Keys are composite:
//! `{site}/{phen}.{sig}/{event_id}/{start}:{end}` for time-keyed records
//! and `{site}/{phen}.{sig}/{event_id}/etn-{etn}` for ETN-keyed ones, so
//! prefix scans narrow lookups by site and hazard type.

use redb::TableDefinition;

/// Interoperability records keyed by their composite identity.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("interop_records");
