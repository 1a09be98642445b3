//! Get information about the available offsets for a given topic partition.

pub mod request;
pub mod response;
