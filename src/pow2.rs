/// Rounds the given value up to the next power of two.
///
/// Zero rounds up to one, and values that already are a power of two are
/// returned unchanged.
///
/// # Examples
///
/// ```rust
/// use rbuddy::upper_pow2;
///
/// assert_eq!(upper_pow2!(1000), 1024);
/// assert_eq!(upper_pow2!(128), 128);
/// assert_eq!(upper_pow2!(100), 128);
/// ```
#[macro_export]
macro_rules! upper_pow2 {
  ($value:expr) => {
    ($value as usize).next_power_of_two()
  };
}

/// Non-panicking counterpart of [`upper_pow2!`]: `None` when the next power
/// of two does not fit in a `usize`.
pub fn upper_pow2(n: usize) -> Option<usize> {
  n.checked_next_power_of_two()
}

pub fn is_pow2(n: usize) -> bool {
  n.is_power_of_two()
}

/// Log base 2 of a power of two, i.e. its order.
///
/// For anything else the result is the position of the lowest set bit, so
/// callers are expected to round with [`upper_pow2`] first.
pub fn log2(pow2: usize) -> u32 {
  debug_assert!(is_pow2(pow2), "log2 of non power of two {pow2}");
  pow2.trailing_zeros()
}
