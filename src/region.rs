use std::{io, ptr::NonNull};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};

use crate::error::ArenaInitError;

/// The memory handed out by the allocator: one anonymous private mapping,
/// unmapped again on drop.
///
/// The allocator itself never reads or writes this memory. Its bookkeeping
/// lives entirely in the bitmap and the free lists.
#[derive(Debug)]
pub struct Region {
  base: NonNull<u8>,
  len: usize,
}

impl Region {
  pub fn map(len: usize) -> Result<Self, ArenaInitError> {
    let address = unsafe {
      mmap(
        std::ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return Err(ArenaInitError::Region {
        size: len,
        source: io::Error::last_os_error(),
      });
    }

    let base = NonNull::new(address as *mut u8).ok_or_else(|| ArenaInitError::Region {
      size: len,
      source: io::Error::other("mmap returned a null mapping"),
    })?;

    Ok(Self { base, len })
  }

  pub fn as_ptr(&self) -> *mut u8 {
    self.base.as_ptr()
  }

  /// Offset of `ptr` from the start of the region, if it points inside it.
  pub fn offset_of(
    &self,
    ptr: *const u8,
  ) -> Option<usize> {
    let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;
    (offset < self.len).then_some(offset)
  }

  /// Pointer to the byte at `offset`, if it is inside the region.
  pub fn at(
    &self,
    offset: usize,
  ) -> Option<NonNull<u8>> {
    if offset >= self.len {
      return None;
    }
    // SAFETY: `offset` is within the mapping, so the result stays in bounds
    // and is non-null.
    Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) })
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    unsafe {
      munmap(self.base.as_ptr() as *mut c_void, self.len);
    }
  }
}
