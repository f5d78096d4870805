use crate::error::ArenaInitError;

const BITS: usize = 8;

/// One bit per minimum-size unit of the arena.
///
/// Bits are stored most significant first inside each byte, so bit `i` lives
/// in byte `i / 8` under the mask `0x80 >> (i % 8)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
  bytes: Vec<u8>,
  len: usize,
}

#[inline(always)]
fn mask(bit: usize) -> u8 {
  0x80 >> (bit % BITS)
}

impl Bitmap {
  /// Reserves a zeroed bitmap of `len` bits, failing instead of aborting
  /// when the storage cannot be obtained.
  pub fn try_new(len: usize) -> Result<Self, ArenaInitError> {
    let byte_len = len.div_ceil(BITS);
    let mut bytes = Vec::new();

    bytes
      .try_reserve_exact(byte_len)
      .map_err(|_| ArenaInitError::BitmapStorage { bytes: byte_len })?;
    bytes.resize(byte_len, 0);

    Ok(Self { bytes, len })
  }

  pub fn len(&self) -> usize {
    self.len
  }

  #[inline]
  pub fn set(
    &mut self,
    bit: usize,
  ) {
    debug_assert!(bit < self.len);
    self.bytes[bit / BITS] |= mask(bit);
  }

  #[inline]
  pub fn clear(
    &mut self,
    bit: usize,
  ) {
    debug_assert!(bit < self.len);
    self.bytes[bit / BITS] &= !mask(bit);
  }

  #[inline]
  pub fn is_set(
    &self,
    bit: usize,
  ) -> bool {
    bit < self.len && self.bytes[bit / BITS] & mask(bit) != 0
  }

  /// First set bit at or after `from`.
  pub fn first_set_from(
    &self,
    from: usize,
  ) -> Option<usize> {
    let mut bit = from;

    while bit < self.len {
      // Skip whole bytes that have nothing set past `bit`.
      let byte = self.bytes[bit / BITS] & (0xFF >> (bit % BITS));
      if byte == 0 {
        bit = (bit / BITS + 1) * BITS;
        continue;
      }

      let found = (bit / BITS) * BITS + byte.leading_zeros() as usize;
      return (found < self.len).then_some(found);
    }

    None
  }

  pub fn count_ones(&self) -> usize {
    self.bytes.iter().map(|b| b.count_ones() as usize).sum()
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }
}
