//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{
    CrossReferencedSession, ExtendedTable, Hemisphere, LoaderError, MovementRecord, SessionRecord,
    SessionTable, Subject,
};
pub use writers::{write_extended_table, write_site_csvs, write_site_jsons, WriteError};
