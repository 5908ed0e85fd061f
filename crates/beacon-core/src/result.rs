//! Result type aliases for Beacon.

use crate::BeaconError;

/// A specialized `Result` type for Beacon operations.
pub type BeaconResult<T> = Result<T, BeaconError>;
