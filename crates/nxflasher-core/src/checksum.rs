//! SHA-1 accumulator handed to back ends by the checksum operation

pub use sha1::{Digest, Sha1};

/// Length of the digest written by the checksum operation
pub const DIGEST_LEN: usize = 20;

/// Running hash a back end feeds while it streams the device
pub type Accumulator = Sha1;
