/// A block of the arena, identified by where it starts and how big it is.
///
/// `offset` is relative to the arena base and is always a multiple of
/// `1 << order`. Blocks are plain values: they only describe a span, the
/// bookkeeping for them lives in the bitmap and the free lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Block {
  pub offset: usize,
  pub order: u32,
}

impl Block {
  pub fn new(
    offset: usize,
    order: u32,
  ) -> Self {
    debug_assert_eq!(offset & ((1 << order) - 1), 0, "misaligned block");
    Self { offset, order }
  }

  pub fn size(&self) -> usize {
    1 << self.order
  }

  pub fn end(&self) -> usize {
    self.offset + self.size()
  }

  /// The other half of this block's parent: the offset differs in exactly
  /// the `1 << order` bit.
  pub fn buddy(&self) -> Self {
    Self {
      offset: self.offset ^ self.size(),
      order: self.order,
    }
  }

  pub fn parent(&self) -> Self {
    let order = self.order + 1;
    Self {
      offset: self.offset & !((1 << order) - 1),
      order,
    }
  }

  /// Splits the block in two halves of the next lower order, lower address
  /// first.
  pub fn split(&self) -> (Self, Self) {
    debug_assert!(self.order > 0);
    let order = self.order - 1;
    (
      Self {
        offset: self.offset,
        order,
      },
      Self {
        offset: self.offset + (1 << order),
        order,
      },
    )
  }

  /// Index of the first minimum-size unit covered by the block.
  pub fn first_unit(
    &self,
    min_order: u32,
  ) -> usize {
    self.offset >> min_order
  }

  /// Index of the last minimum-size unit covered by the block. This is the
  /// block's terminating bit in the allocation bitmap.
  pub fn last_unit(
    &self,
    min_order: u32,
  ) -> usize {
    (self.end() >> min_order) - 1
  }
}
