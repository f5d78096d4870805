use std::{fmt, ptr::NonNull};

use log::{debug, trace, warn};

use crate::{
  bitmap::Bitmap,
  block::Block,
  config::ArenaConfig,
  dump::MemoryMap,
  error::{AllocError, ArenaInitError, FreeError},
  free_list::FreeLists,
  pow2::{log2, upper_pow2},
  region::Region,
  upper_pow2,
};

/// Byte offset of a block, relative to the start of its arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(usize);

impl Offset {
  pub const fn new(offset: usize) -> Self {
    Self(offset)
  }

  pub const fn get(self) -> usize {
    self.0
  }
}

impl fmt::Display for Offset {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Binary buddy allocator over a single mapped arena.
///
/// State is tracked without any per-block header inside the arena:
///
/// - the bitmap holds one bit per minimum-size unit, set only at the last
///   unit of every allocated block, which is enough to recover a block's
///   size from its start offset alone;
/// - the free lists hold, for each order, the blocks of exactly that size
///   that are free and not subdivided.
///
/// The allocator is single-threaded. Sharing it requires wrapping every call
/// behind one lock, since any operation may touch the whole bitmap and any
/// free list.
pub struct BuddyAllocator {
  region: Region,
  total_size: usize,
  total_order: u32,
  min_size: usize,
  min_order: u32,
  bitmap: Bitmap,
  free_lists: FreeLists,
}

impl BuddyAllocator {
  /// Builds an arena from `config`, rounding both sizes up to powers of two.
  ///
  /// The whole arena starts out as a single free block of `total_order`.
  pub fn new(config: ArenaConfig) -> Result<Self, ArenaInitError> {
    let ArenaConfig {
      total_size,
      min_size,
    } = config;

    let total_size = upper_pow2(total_size)
      .filter(|_| total_size > 0)
      .ok_or(ArenaInitError::InvalidSize {
        what: "arena",
        size: total_size,
      })?;
    let min_size = upper_pow2(min_size)
      .filter(|_| min_size > 0)
      .ok_or(ArenaInitError::InvalidSize {
        what: "minimum block",
        size: min_size,
      })?;

    if min_size > total_size {
      return Err(ArenaInitError::MinLargerThanTotal {
        total_size,
        min_size,
      });
    }

    let total_order = log2(total_size);
    let min_order = log2(min_size);
    let units = total_size >> min_order;

    let bitmap = Bitmap::try_new(units)?;
    let mut free_lists = FreeLists::try_new(total_order)?;
    let region = Region::map(total_size)?;

    free_lists.push(total_order, 0);

    debug!(
      "arena of {total_size} bytes (order {total_order}) at {:?}, {units} units of {min_size} bytes (order {min_order})",
      region.as_ptr()
    );

    Ok(Self {
      region,
      total_size,
      total_order,
      min_size,
      min_order,
      bitmap,
      free_lists,
    })
  }

  /// Shorthand for [`BuddyAllocator::new`] with explicit sizes.
  pub fn init(
    total_size: usize,
    min_size: usize,
  ) -> Result<Self, ArenaInitError> {
    Self::new(ArenaConfig::new(total_size, min_size))
  }

  /// Allocates a block of at least `size` bytes.
  ///
  /// Sizes below the minimum block size are clamped up to it, so `alloc(0)`
  /// still hands out one minimum-size block.
  pub fn alloc(
    &mut self,
    size: usize,
  ) -> Result<Offset, AllocError> {
    if size > self.total_size {
      return Err(AllocError::TooLarge {
        requested: size,
        total: self.total_size,
      });
    }

    let order = log2(upper_pow2!(size.max(self.min_size)));

    let (found, unit) = (order..=self.total_order)
      .find_map(|o| self.free_lists.pop(o).map(|unit| (o, unit)))
      .ok_or(AllocError::Exhausted { requested: size })?;

    let mut block = Block::new(unit << self.min_order, found);

    // Keep the first half, free the second one.
    while block.order > order {
      let (first, second) = block.split();
      self
        .free_lists
        .push(second.order, second.first_unit(self.min_order));
      trace!("split {} bytes at {}", block.size(), block.offset);
      block = first;
    }

    self.bitmap.set(block.last_unit(self.min_order));
    trace!("allocated {} bytes at {} for a {size} byte request", block.size(), block.offset);

    Ok(Offset(block.offset))
  }

  /// Recovers the order of the allocated block starting at `offset`.
  ///
  /// Probes the bitmap at `start`, `start + 1`, `start + 3`, `start + 7`, ...
  /// which are exactly the last units of blocks of increasing order starting
  /// at `start`. Since only the last unit of an allocated block is ever set,
  /// the first set bit gives the block's size.
  pub fn block_order(
    &self,
    offset: Offset,
  ) -> Option<u32> {
    if offset.0 & (self.min_size - 1) != 0 {
      return None;
    }

    let start = offset.0 >> self.min_order;
    let units = self.units();
    let mut n = 0usize;

    while start + n < units {
      if self.bitmap.is_set(start + n) {
        return Some(log2((n + 1) << self.min_order));
      }
      n = 2 * n + 1;
    }

    None
  }

  /// Returns the block at `offset` to the arena, merging it with its buddy for
  /// as long as the buddy is free and whole.
  ///
  /// Everything is validated before the bitmap or free lists are touched, so
  /// an error leaves the allocator exactly as it was.
  ///
  /// Frees of an offset that is currently the start of a free block are
  /// rejected with [`FreeError::NotAllocated`]. Frees of an offset inside a
  /// larger allocated block that happens to line up with its last unit are
  /// not detectable from the bitmap and will corrupt the arena.
  pub fn free(
    &mut self,
    offset: Offset,
  ) -> Result<(), FreeError> {
    let mut block = match self.validate_free(offset) {
      Ok(block) => block,
      Err(err) => {
        warn!("rejected free at {offset}: {err}");
        return Err(err);
      }
    };

    let min_order = self.min_order;
    trace!("freeing {} bytes at {}", block.size(), block.offset);

    while block.order < self.total_order {
      let buddy = block.buddy();

      if self.bitmap.is_set(buddy.last_unit(min_order)) {
        break;
      }
      // Not on the list at this exact order means the buddy is split.
      if !self.free_lists.remove(buddy.order, buddy.first_unit(min_order)) {
        break;
      }

      let lower = if buddy.offset < block.offset { buddy } else { block };
      self.bitmap.clear(lower.last_unit(min_order));
      block = lower.parent();
      trace!("merged into {} bytes at {}", block.size(), block.offset);
    }

    self.bitmap.clear(block.last_unit(min_order));
    self.free_lists.push(block.order, block.first_unit(min_order));

    Ok(())
  }

  /// [`BuddyAllocator::free`] for a raw pointer obtained from
  /// [`BuddyAllocator::as_ptr`].
  pub fn free_ptr(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), FreeError> {
    if ptr.is_null() {
      warn!("rejected free of a null pointer");
      return Err(FreeError::NullPointer);
    }
    let offset = self.offset_of(ptr)?;
    self.free(offset)
  }

  fn validate_free(
    &self,
    offset: Offset,
  ) -> Result<Block, FreeError> {
    if offset.0 >= self.total_size {
      return Err(FreeError::OutOfRange {
        offset: offset.0,
        total: self.total_size,
      });
    }

    // The start of a free block can never be an allocated block too.
    if offset.0 & (self.min_size - 1) == 0
      && self.free_lists.order_at(offset.0 >> self.min_order).is_some()
    {
      return Err(FreeError::NotAllocated { offset: offset.0 });
    }

    let unknown = FreeError::UnknownBlock { offset: offset.0 };
    let order = self.block_order(offset).ok_or(unknown)?;
    if order < self.min_order || order > self.total_order {
      return Err(unknown);
    }
    // A real block starts on a multiple of its own size.
    if offset.0 & ((1 << order) - 1) != 0 {
      return Err(unknown);
    }

    Ok(Block::new(offset.0, order))
  }

  /// Current layout of the arena, lowest address first.
  ///
  /// Free blocks are found through their free-list headers, allocated ones
  /// by scanning forward to their terminating bit.
  pub fn dump(&self) -> MemoryMap {
    let mut map = MemoryMap::default();
    let units = self.units();
    let mut unit = 0;

    while unit < units {
      let offset = unit << self.min_order;

      if let Some(order) = self.free_lists.order_at(unit) {
        map.push(offset, 1 << order, false);
        unit += 1 << (order - self.min_order);
        continue;
      }

      match self.bitmap.first_set_from(unit) {
        Some(last) => {
          map.push(offset, (last + 1 - unit) << self.min_order, true);
          unit = last + 1;
        }
        None => {
          debug_assert!(false, "unit {unit} is neither free nor allocated");
          break;
        }
      }
    }

    map
  }

  /// Pointer to the first byte of the block at `offset`.
  pub fn as_ptr(
    &self,
    offset: Offset,
  ) -> Option<NonNull<u8>> {
    self.region.at(offset.0)
  }

  /// Arena offset of a pointer into the arena.
  pub fn offset_of(
    &self,
    ptr: *const u8,
  ) -> Result<Offset, FreeError> {
    self
      .region
      .offset_of(ptr)
      .map(Offset)
      .ok_or(FreeError::OutOfRange {
        offset: (ptr as usize).wrapping_sub(self.region.as_ptr() as usize),
        total: self.total_size,
      })
  }

  pub fn total_size(&self) -> usize {
    self.total_size
  }

  pub fn total_order(&self) -> u32 {
    self.total_order
  }

  pub fn min_size(&self) -> usize {
    self.min_size
  }

  pub fn min_order(&self) -> u32 {
    self.min_order
  }

  /// Number of minimum-size units, i.e. bits in the bitmap.
  pub fn units(&self) -> usize {
    self.total_size >> self.min_order
  }

  pub fn bitmap(&self) -> &Bitmap {
    &self.bitmap
  }

  /// Offsets of the free blocks of exactly `order`, in the order they will
  /// be handed out.
  pub fn free_blocks(
    &self,
    order: u32,
  ) -> Vec<Offset> {
    if order < self.min_order || order > self.total_order {
      return Vec::new();
    }
    self
      .free_lists
      .iter(order)
      .map(|unit| Offset(unit << self.min_order))
      .collect()
  }

  pub fn free_bytes(&self) -> usize {
    (self.min_order..=self.total_order)
      .map(|order| self.free_lists.len(order) << order)
      .sum()
  }
}

impl fmt::Debug for BuddyAllocator {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("BuddyAllocator")
      .field("base", &self.region.as_ptr())
      .field("total_size", &self.total_size)
      .field("min_size", &self.min_size)
      .field("layout", &format_args!("{}", self.dump()))
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use proptest::prelude::*;

  use super::*;

  fn arena() -> BuddyAllocator {
    BuddyAllocator::init(4096, 128).unwrap()
  }

  /// Checks the bookkeeping against the set of live blocks the test knows
  /// about: every unit is covered exactly once, each live block has exactly
  /// one set bit at its last unit, and no two free buddies sit side by side.
  fn check_invariants(
    allocator: &BuddyAllocator,
    live: &[(Offset, u32)],
  ) {
    let min_order = allocator.min_order();
    let mut covered = vec![false; allocator.units()];
    let mut cover = |block: Block| {
      for unit in block.first_unit(min_order)..=block.last_unit(min_order) {
        assert!(!covered[unit], "unit {unit} covered twice");
        covered[unit] = true;
      }
    };

    let mut free = HashSet::new();
    for order in allocator.min_order()..=allocator.total_order() {
      for offset in allocator.free_blocks(order) {
        let block = Block::new(offset.get(), order);
        cover(block);
        free.insert(block);
      }
    }
    for &(offset, order) in live {
      cover(Block::new(offset.get(), order));
    }
    assert!(covered.iter().all(|&c| c), "arena has gaps");

    let mut expected = Bitmap::try_new(allocator.units()).unwrap();
    for &(offset, order) in live {
      expected.set(Block::new(offset.get(), order).last_unit(min_order));
    }
    assert_eq!(&expected, allocator.bitmap());

    for block in &free {
      if block.order < allocator.total_order() {
        assert!(!free.contains(&block.buddy()), "unmerged buddies {block:?}");
      }
    }

    let map = allocator.dump();
    assert_eq!(allocator.total_size(), map.allocated_bytes() + map.free_bytes());
    assert_eq!(allocator.free_bytes(), map.free_bytes());
  }

  #[test]
  fn test_init_rounds_to_pow2() {
    let allocator = BuddyAllocator::init(1000, 100).unwrap();
    assert_eq!(1024, allocator.total_size());
    assert_eq!(128, allocator.min_size());
    assert_eq!(10, allocator.total_order());
    assert_eq!(7, allocator.min_order());
    assert_eq!(8, allocator.units());
    assert_eq!("(1024F)", allocator.dump().to_string());
  }

  #[test]
  fn test_init_rejects_bad_sizes() {
    assert!(matches!(
      BuddyAllocator::init(0, 128),
      Err(ArenaInitError::InvalidSize { what: "arena", .. })
    ));
    assert!(matches!(
      BuddyAllocator::init(4096, 0),
      Err(ArenaInitError::InvalidSize { .. })
    ));
    assert!(matches!(
      BuddyAllocator::init(1024, 2048),
      Err(ArenaInitError::MinLargerThanTotal {
        total_size: 1024,
        min_size: 2048
      })
    ));
  }

  #[test]
  fn test_single_block_arena() {
    let mut allocator = BuddyAllocator::init(128, 128).unwrap();
    let offset = allocator.alloc(1).unwrap();
    assert_eq!(Offset::new(0), offset);
    assert_eq!(Some(7), allocator.block_order(offset));

    allocator.free(offset).unwrap();
    assert_eq!("(128F)", allocator.dump().to_string());
  }

  #[test]
  fn test_small_requests_clamp_to_min() {
    let mut allocator = arena();

    let zero = allocator.alloc(0).unwrap();
    let one = allocator.alloc(1).unwrap();

    assert_eq!(Some(7), allocator.block_order(zero));
    assert_eq!(Some(7), allocator.block_order(one));
    check_invariants(&allocator, &[(zero, 7), (one, 7)]);
  }

  #[test]
  fn test_too_large() {
    let mut allocator = arena();
    assert_eq!(
      Err(AllocError::TooLarge {
        requested: 4097,
        total: 4096
      }),
      allocator.alloc(4097)
    );
    assert_eq!("(4096F)", allocator.dump().to_string());
  }

  #[test]
  fn test_exhaustion() {
    let mut allocator = arena();

    let whole = allocator.alloc(4096).unwrap();
    assert_eq!(Offset::new(0), whole);
    assert_eq!(Err(AllocError::Exhausted { requested: 1 }), allocator.alloc(1));
    assert_eq!("(4096A)", allocator.dump().to_string());

    allocator.free(whole).unwrap();
    assert!(allocator.alloc(1).is_ok());
  }

  #[test]
  fn test_split_merge_round_trip() {
    let mut allocator = arena();
    let initial = allocator.bitmap().clone();

    let a = allocator.alloc(128).unwrap();
    let b = allocator.alloc(128).unwrap();
    allocator.free(a).unwrap();
    allocator.free(b).unwrap();

    assert_eq!(&initial, allocator.bitmap());
    assert_eq!(vec![Offset::new(0)], allocator.free_blocks(12));
    for order in 7..12 {
      assert!(allocator.free_blocks(order).is_empty());
    }
  }

  #[test]
  fn test_scenario() {
    let mut allocator = arena();

    let a = allocator.alloc(128).unwrap();
    assert_eq!(Offset::new(0), a);
    assert_eq!(
      "(128A)(128F)(256F)(512F)(1024F)(2048F)",
      allocator.dump().to_string()
    );

    let b = allocator.alloc(128).unwrap();
    assert_eq!(Offset::new(128), b);
    assert_eq!(
      "(128A)(128A)(256F)(512F)(1024F)(2048F)",
      allocator.dump().to_string()
    );

    allocator.free(a).unwrap();
    assert_eq!(
      "(128F)(128A)(256F)(512F)(1024F)(2048F)",
      allocator.dump().to_string()
    );
    assert_eq!(vec![Offset::new(0)], allocator.free_blocks(7));

    allocator.free(b).unwrap();
    assert_eq!("(4096F)", allocator.dump().to_string());
    assert_eq!(0, allocator.bitmap().count_ones());
  }

  #[test]
  fn test_free_lists_are_lifo() {
    let mut allocator = arena();

    let a = allocator.alloc(128).unwrap();
    let b = allocator.alloc(128).unwrap();
    let c = allocator.alloc(128).unwrap();
    let d = allocator.alloc(128).unwrap();
    assert_eq!(Offset::new(256), c);
    assert_eq!(Offset::new(384), d);

    allocator.free(a).unwrap();
    allocator.free(c).unwrap();
    assert_eq!(vec![Offset::new(256), Offset::new(0)], allocator.free_blocks(7));

    let e = allocator.alloc(1).unwrap();
    assert_eq!(c, e);
    check_invariants(&allocator, &[(b, 7), (d, 7), (e, 7)]);
  }

  #[test]
  fn test_free_merges_up_to_allocated_buddy() {
    let mut allocator = arena();

    let a = allocator.alloc(128).unwrap();
    let b = allocator.alloc(512).unwrap();
    assert_eq!(Offset::new(512), b);

    allocator.free(a).unwrap();
    assert_eq!(vec![Offset::new(0)], allocator.free_blocks(9));
    assert_eq!("(512F)(512A)(1024F)(2048F)", allocator.dump().to_string());
    check_invariants(&allocator, &[(b, 9)]);
  }

  #[test]
  fn test_buddy_identity() {
    let mut allocator = arena();

    let a = allocator.alloc(256).unwrap();
    let b = allocator.alloc(256).unwrap();
    assert_eq!(b.get(), a.get() ^ 256);

    let c = allocator.alloc(1024).unwrap();
    let order = allocator.block_order(c).unwrap();
    let buddy = Block::new(c.get(), order).buddy();
    assert_eq!(c.get() ^ 1024, buddy.offset);
  }

  #[test]
  fn test_order_discovery_every_order() {
    for order in 7..=12 {
      let mut allocator = arena();
      let offset = allocator.alloc(1 << order).unwrap();
      assert_eq!(Some(order), allocator.block_order(offset));
      allocator.free(offset).unwrap();
      assert_eq!("(4096F)", allocator.dump().to_string());
    }
  }

  #[test]
  fn test_order_discovery_next_to_neighbours() {
    for order in 7..=11 {
      let mut allocator = arena();
      let neighbour = allocator.alloc(128).unwrap();
      let offset = allocator.alloc(1 << order).unwrap();

      assert_eq!(Some(order), allocator.block_order(offset));
      assert_eq!(Some(7), allocator.block_order(neighbour));

      allocator.free(offset).unwrap();
      check_invariants(&allocator, &[(neighbour, 7)]);
    }
  }

  #[test]
  fn test_free_errors() {
    let mut allocator = arena();

    assert_eq!(
      Err(FreeError::OutOfRange {
        offset: 4096,
        total: 4096
      }),
      allocator.free(Offset::new(4096))
    );
    assert_eq!(
      Err(FreeError::NotAllocated { offset: 0 }),
      allocator.free(Offset::new(0))
    );
    assert_eq!(
      Err(FreeError::UnknownBlock { offset: 128 }),
      allocator.free(Offset::new(128))
    );
    assert_eq!(Err(FreeError::NullPointer), allocator.free_ptr(std::ptr::null_mut()));

    let a = allocator.alloc(256).unwrap();
    assert_eq!(
      Err(FreeError::UnknownBlock { offset: 64 }),
      allocator.free(Offset::new(64))
    );
    check_invariants(&allocator, &[(a, 8)]);
  }

  #[test]
  fn test_double_free_is_rejected() {
    let mut allocator = arena();

    let a = allocator.alloc(128).unwrap();
    let b = allocator.alloc(128).unwrap();
    allocator.free(a).unwrap();

    let before = allocator.dump();
    assert_eq!(Err(FreeError::NotAllocated { offset: 0 }), allocator.free(a));
    assert_eq!(before, allocator.dump());
    check_invariants(&allocator, &[(b, 7)]);
  }

  #[test]
  fn test_free_twice_is_not_allocated() {
    let mut allocator = arena();

    let x = allocator.alloc(128).unwrap();
    allocator.free(x).unwrap();
    assert_eq!(Err(FreeError::NotAllocated { offset: 0 }), allocator.free(x));
    assert_eq!("(4096F)", allocator.dump().to_string());

    let a = allocator.alloc(128).unwrap();
    let b = allocator.alloc(128).unwrap();
    let c = allocator.alloc(128).unwrap();
    allocator.free(b).unwrap();

    // Nothing in the bitmap marks b's span any more, only its free-list node.
    let before = allocator.dump();
    assert_eq!(Err(FreeError::NotAllocated { offset: 128 }), allocator.free(b));
    assert_eq!(before, allocator.dump());
    check_invariants(&allocator, &[(a, 7), (c, 7)]);
  }

  #[test]
  fn test_misaligned_span_is_rejected() {
    let mut allocator = arena();

    let a = allocator.alloc(512).unwrap();
    let b = allocator.alloc(128).unwrap();
    assert_eq!(Offset::new(512), b);

    // From unit 1, inside a, the search skips a's last unit and stops at b's
    // at unit 4: a 512-byte span, which cannot start at 128.
    assert_eq!(
      Err(FreeError::UnknownBlock { offset: 128 }),
      allocator.free(Offset::new(128))
    );
    check_invariants(&allocator, &[(a, 9), (b, 7)]);
  }

  #[test]
  fn test_pointers() {
    let mut allocator = arena();

    let offset = allocator.alloc(300).unwrap();
    let ptr = allocator.as_ptr(offset).unwrap().as_ptr();

    unsafe {
      for i in 0..512 {
        *ptr.add(i) = i as u8;
      }
      assert_eq!(255, *ptr.add(255));
    }

    assert_eq!(Ok(offset), allocator.offset_of(ptr));
    assert!(allocator.as_ptr(Offset::new(4096)).is_none());

    let outside = 0x10usize as *mut u8;
    assert!(matches!(
      allocator.free_ptr(outside),
      Err(FreeError::OutOfRange { .. })
    ));

    allocator.free_ptr(ptr).unwrap();
    assert_eq!("(4096F)", allocator.dump().to_string());
  }

  #[derive(Clone, Debug)]
  enum Op {
    Alloc(usize),
    Free(usize),
  }

  fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
      (0usize..=2048).prop_map(Op::Alloc),
      (0usize..=1024).prop_map(Op::Alloc),
      any::<usize>().prop_map(Op::Free),
    ]
  }

  proptest! {
    #[test]
    fn random_ops_keep_invariants(ops in proptest::collection::vec(arb_op(), 1..64)) {
      let mut allocator = arena();
      let initial = allocator.bitmap().clone();
      let mut live: Vec<(Offset, u32)> = Vec::new();

      for op in ops {
        match op {
          Op::Alloc(size) => match allocator.alloc(size) {
            Ok(offset) => {
              let order = log2(upper_pow2!(size.max(128)));
              prop_assert_eq!(offset.get() % (1 << order), 0);
              live.push((offset, order));
            }
            Err(AllocError::Exhausted { .. }) => {
              let order = log2(upper_pow2!(size.max(128)));
              for o in order..=12 {
                prop_assert!(allocator.free_blocks(o).is_empty());
              }
            }
            Err(err) => prop_assert!(false, "unexpected {err}"),
          },
          Op::Free(index) => {
            if live.is_empty() {
              continue;
            }
            let (offset, _) = live.swap_remove(index % live.len());
            prop_assert_eq!(Ok(()), allocator.free(offset));
          }
        }

        for &(offset, order) in &live {
          prop_assert_eq!(Some(order), allocator.block_order(offset));
        }
        check_invariants(&allocator, &live);
      }

      for (offset, _) in live.drain(..) {
        prop_assert_eq!(Ok(()), allocator.free(offset));
      }
      prop_assert_eq!(&initial, allocator.bitmap());
      prop_assert_eq!("(4096F)", allocator.dump().to_string());
    }
  }
}
