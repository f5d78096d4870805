//! Per-order free lists.
//!
//! Each free block is linked through a node keyed by the index of its first
//! minimum-size unit. The node plays the part of the block header that a C
//! allocator would write into the free memory itself, without ever touching
//! the arena. Only free blocks have a node, so the table stays as small as
//! the number of free blocks.

use std::collections::BTreeMap;

use crate::error::ArenaInitError;

/// Header of a free block: its order plus the list linkage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeNode {
  pub order: u32,
  prev: Option<usize>,
  next: Option<usize>,
}

#[derive(Debug)]
pub struct FreeLists {
  /// Head unit of each list, indexed by order.
  heads: Vec<Option<usize>>,
  /// Headers of the free blocks, keyed by first unit.
  nodes: BTreeMap<usize, FreeNode>,
  /// Number of blocks on each list.
  lens: Vec<usize>,
}

impl FreeLists {
  /// Reserves an empty list for each order up to `max_order`.
  pub fn try_new(max_order: u32) -> Result<Self, ArenaInitError> {
    let orders = max_order as usize + 1;
    let mut heads = Vec::new();
    let mut lens = Vec::new();

    let storage = || ArenaInitError::FreeListStorage { orders };
    heads.try_reserve_exact(orders).map_err(|_| storage())?;
    lens.try_reserve_exact(orders).map_err(|_| storage())?;

    heads.resize(orders, None);
    lens.resize(orders, 0);

    Ok(Self {
      heads,
      nodes: BTreeMap::new(),
      lens,
    })
  }

  pub fn len(
    &self,
    order: u32,
  ) -> usize {
    self.lens[order as usize]
  }

  /// Number of free blocks across all orders.
  pub fn blocks(&self) -> usize {
    self.nodes.len()
  }

  /// Order of the free block starting at `unit`, if there is one.
  pub fn order_at(
    &self,
    unit: usize,
  ) -> Option<u32> {
    self.nodes.get(&unit).map(|node| node.order)
  }

  /// Links the block starting at `unit` at the head of `free_lists[order]`.
  pub fn push(
    &mut self,
    order: u32,
    unit: usize,
  ) {
    debug_assert!(!self.nodes.contains_key(&unit), "unit {unit} is already free");

    let head = self.heads[order as usize];
    if let Some(node) = head.and_then(|head| self.nodes.get_mut(&head)) {
      node.prev = Some(unit);
    }

    self.nodes.insert(
      unit,
      FreeNode {
        order,
        prev: None,
        next: head,
      },
    );
    self.heads[order as usize] = Some(unit);
    self.lens[order as usize] += 1;
  }

  /// Unlinks and returns the head unit of `free_lists[order]`.
  pub fn pop(
    &mut self,
    order: u32,
  ) -> Option<usize> {
    let head = self.heads[order as usize]?;
    self.remove(order, head).then_some(head)
  }

  /// Unlinks the block starting at `unit` from `free_lists[order]`.
  ///
  /// Returns `false` and leaves everything untouched when no block of that
  /// order starts at `unit`.
  pub fn remove(
    &mut self,
    order: u32,
    unit: usize,
  ) -> bool {
    let node = match self.nodes.get(&unit) {
      Some(&node) if node.order == order => node,
      _ => return false,
    };

    match node.prev.and_then(|prev| self.nodes.get_mut(&prev)) {
      Some(prev) => prev.next = node.next,
      None => self.heads[order as usize] = node.next,
    }
    if let Some(next) = node.next.and_then(|next| self.nodes.get_mut(&next)) {
      next.prev = node.prev;
    }

    self.nodes.remove(&unit);
    self.lens[order as usize] -= 1;
    true
  }

  /// Units of the blocks on `free_lists[order]`, head first.
  pub fn iter(
    &self,
    order: u32,
  ) -> impl Iterator<Item = usize> + '_ {
    let mut current = self.heads.get(order as usize).copied().flatten();

    std::iter::from_fn(move || {
      let unit = current?;
      current = self.nodes.get(&unit).and_then(|node| node.next);
      Some(unit)
    })
  }
}
