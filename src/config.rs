//! Arena sizing.

use std::env;

use crate::{error::ConfigError, pow2::upper_pow2};

/// Requested sizes for a buddy arena.
///
/// Both sizes are rounded up to powers of two when the allocator is built, so
/// `ArenaConfig::new(1000, 100)` manages 1024 bytes in 128-byte units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
  /// Bytes managed by the arena.
  pub total_size: usize,
  /// Smallest block handed out, also the bitmap granularity.
  pub min_size: usize,
}

impl ArenaConfig {
  pub const DEFAULT_TOTAL_SIZE: usize = 4096;
  pub const DEFAULT_MIN_SIZE: usize = 128;

  pub const TOTAL_SIZE_VAR: &'static str = "RBUDDY_TOTAL_SIZE";
  pub const MIN_SIZE_VAR: &'static str = "RBUDDY_MIN_SIZE";

  pub fn new(
    total_size: usize,
    min_size: usize,
  ) -> Self {
    Self {
      total_size,
      min_size,
    }
  }

  /// Reads `RBUDDY_TOTAL_SIZE` and `RBUDDY_MIN_SIZE`, falling back to the
  /// defaults for whichever is unset.
  pub fn from_env() -> Result<Self, ConfigError> {
    Ok(Self {
      total_size: read_var(Self::TOTAL_SIZE_VAR, Self::DEFAULT_TOTAL_SIZE)?,
      min_size: read_var(Self::MIN_SIZE_VAR, Self::DEFAULT_MIN_SIZE)?,
    })
  }

  /// The sizes the arena will actually use, `None` if either one cannot be
  /// rounded up to a power of two.
  pub fn rounded(&self) -> Option<(usize, usize)> {
    Some((upper_pow2(self.total_size)?, upper_pow2(self.min_size)?))
  }
}

impl Default for ArenaConfig {
  fn default() -> Self {
    Self::new(Self::DEFAULT_TOTAL_SIZE, Self::DEFAULT_MIN_SIZE)
  }
}

fn read_var(
  var: &'static str,
  default: usize,
) -> Result<usize, ConfigError> {
  match env::var(var) {
    Ok(value) => parse_size(var, &value),
    Err(_) => Ok(default),
  }
}

fn parse_size(
  var: &'static str,
  value: &str,
) -> Result<usize, ConfigError> {
  value.trim().parse().map_err(|_| ConfigError::Parse {
    var,
    value: value.to_string(),
  })
}
