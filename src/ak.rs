//! Anyka firmware image module

pub mod env;
pub mod partition;

pub use partition::{Partition, PartitionTable};
