//! Error types for every allocator operation.

use std::io;

use thiserror::Error;

/// The arena could not be set up. Fatal for whoever embeds the allocator.
#[derive(Error, Debug)]
pub enum ArenaInitError {
  #[error("invalid {what} size {size}: must be non-zero and round up to a representable power of two")]
  InvalidSize { what: &'static str, size: usize },

  #[error("minimum block size {min_size} is larger than the arena size {total_size}")]
  MinLargerThanTotal { total_size: usize, min_size: usize },

  #[error("could not reserve {bytes} bytes of bitmap storage")]
  BitmapStorage { bytes: usize },

  #[error("could not reserve free-list storage for {orders} orders")]
  FreeListStorage { orders: usize },

  #[error("could not map {size} bytes for the arena: {source}")]
  Region {
    size: usize,
    #[source]
    source: io::Error,
  },
}

/// Allocation failures. Both are recoverable by the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  #[error("requested {requested} bytes, arena holds only {total}")]
  TooLarge { requested: usize, total: usize },

  #[error("no free block can hold {requested} bytes")]
  Exhausted { requested: usize },
}

/// The caller handed `free` something that is not a live allocation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
  #[error("attempted to free a null pointer")]
  NullPointer,

  #[error("offset {offset} lies outside the {total}-byte arena")]
  OutOfRange { offset: usize, total: usize },

  #[error("no allocated block starts at offset {offset}")]
  UnknownBlock { offset: usize },

  #[error("block at offset {offset} is already free")]
  NotAllocated { offset: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  #[error("{var} must be a byte count, got {value:?}")]
  Parse { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_messages_carry_values() {
    let err = AllocError::TooLarge {
      requested: 5000,
      total: 4096,
    };
    assert_eq!("requested 5000 bytes, arena holds only 4096", err.to_string());

    let err = FreeError::OutOfRange {
      offset: 8192,
      total: 4096,
    };
    assert_eq!("offset 8192 lies outside the 4096-byte arena", err.to_string());
  }

  #[test]
  fn test_region_error_has_source() {
    use std::error::Error as _;

    let err = ArenaInitError::Region {
      size: 4096,
      source: io::Error::from(io::ErrorKind::OutOfMemory),
    };
    assert!(err.source().is_some());
  }
}
