use std::fmt;

/// A run of the arena that is either one allocated block or one free block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
  pub offset: usize,
  pub size: usize,
  pub allocated: bool,
}

/// Left-to-right layout of the arena, as produced by
/// [`BuddyAllocator::dump`](crate::BuddyAllocator::dump).
///
/// Renders the way the interactive shell prints it, one `(<size>A)` or
/// `(<size>F)` per segment:
///
/// ```text
///   (128A)(128F)(256F)(512F)(1024F)(2048F)
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryMap {
  segments: Vec<Segment>,
}

impl MemoryMap {
  pub(crate) fn push(
    &mut self,
    offset: usize,
    size: usize,
    allocated: bool,
  ) {
    self.segments.push(Segment {
      offset,
      size,
      allocated,
    });
  }

  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  /// `(size, allocated)` pairs in ascending address order.
  pub fn sizes(&self) -> Vec<(usize, bool)> {
    self.segments.iter().map(|s| (s.size, s.allocated)).collect()
  }

  pub fn allocated_bytes(&self) -> usize {
    self.segments.iter().filter(|s| s.allocated).map(|s| s.size).sum()
  }

  pub fn free_bytes(&self) -> usize {
    self.segments.iter().filter(|s| !s.allocated).map(|s| s.size).sum()
  }
}

impl fmt::Display for MemoryMap {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    for segment in &self.segments {
      let tag = if segment.allocated { 'A' } else { 'F' };
      write!(f, "({}{})", segment.size, tag)?;
    }
    Ok(())
  }
}
