//! Versioned response cache and the request router over it.
//!
//! Cache partitions are named, versioned buckets of request→response
//! snapshots. Exactly one static and one dynamic partition are current at
//! any time; everything else is stale and swept at activation.

mod partition;
mod router;

pub use partition::{delete_partition, partition_names, CacheEntry, CachePartition};
pub use router::{classify, CacheRouter, Strategy};
