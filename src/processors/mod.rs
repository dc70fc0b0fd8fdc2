//! Data processing modules.

pub mod crossref;
pub mod intervals;
pub mod sites;
pub mod spot_check;

// Re-export key types for convenience
pub use crossref::{
    clear_unset_depths, cross_reference, deduplicate_sessions, extend_block_table, first_movements,
    remove_sessions_before_implant, DepthIndex, ExtendStats,
};
pub use intervals::{derive_intervals, ChannelKey, DepthInterval};
pub use sites::{partition_sites, site_descriptors, SiteDescriptor, SiteKey, SiteSession};
pub use spot_check::{run_spot_check, SpotCheckSummary};
