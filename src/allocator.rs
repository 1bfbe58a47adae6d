//! Bitmap block allocator
//!
//! Tracks free space inside the archive body with one bit per allocation
//! unit. The bitmap itself lives in the archive header; the allocator only
//! mutates it and reports offsets, it never touches the storage backend.
//! The owning engine persists the header after every successful mutation
//! and performs the data copy when a reallocation has to move.

use crate::error::{ArchiveError, Result};
use tracing::warn;

/// Bits per allocation table word.
pub const WORD_BITS: u32 = 32;

/// Space manager over the header's allocation table
///
/// Offsets returned by the allocator are absolute byte offsets inside the
/// storage backend: `allocation_base + unit_index * allocation_size`.
#[derive(Debug, Clone)]
pub struct Allocator {
    allocation_size: u32,
    allocation_base: u32,
}

impl Allocator {
    pub fn new(allocation_size: u32, allocation_base: u32) -> Self {
        Allocator {
            allocation_size,
            allocation_base,
        }
    }

    pub fn allocation_size(&self) -> u32 {
        self.allocation_size
    }

    pub fn allocation_base(&self) -> u32 {
        self.allocation_base
    }

    /// Units consumed by a byte size. A zero-byte request still occupies
    /// one unit so that every allocation has a distinct offset.
    pub fn sectors_for(&self, size: u32) -> u32 {
        size.div_ceil(self.allocation_size).max(1)
    }

    /// Number of units currently marked in use.
    pub fn used_sectors(table: &[u32]) -> u32 {
        table.iter().map(|word| word.count_ones()).sum()
    }

    fn unit_of(&self, offset: u32) -> u32 {
        (offset - self.allocation_base) / self.allocation_size
    }

    fn offset_of(&self, unit: u32) -> u32 {
        self.allocation_base + unit * self.allocation_size
    }

    fn is_set(table: &[u32], unit: u32) -> bool {
        table[(unit / WORD_BITS) as usize] & (1 << (unit % WORD_BITS)) != 0
    }

    fn set(table: &mut [u32], unit: u32) {
        table[(unit / WORD_BITS) as usize] |= 1 << (unit % WORD_BITS);
    }

    fn clear(table: &mut [u32], unit: u32) {
        table[(unit / WORD_BITS) as usize] &= !(1 << (unit % WORD_BITS));
    }

    /// Allocate a contiguous run of units for `size` bytes.
    ///
    /// First-fit scan across word boundaries; fails with an out-of-space
    /// error when no free run of sufficient length exists.
    pub fn allocate(&self, table: &mut [u32], size: u32) -> Result<u32> {
        let required = self.sectors_for(size);
        let capacity = table.len() as u32 * WORD_BITS;

        let mut run_start = 0u32;
        let mut run_len = 0u32;

        for unit in 0..capacity {
            if Self::is_set(table, unit) {
                run_start = unit + 1;
                run_len = 0;
                continue;
            }

            run_len += 1;

            if run_len == required {
                for used in run_start..=unit {
                    Self::set(table, used);
                }
                return Ok(self.offset_of(run_start));
            }
        }

        Err(ArchiveError::OutOfSpace(required))
    }

    /// Resize an allocation in place where possible.
    ///
    /// Growing first tries to claim the units immediately after the current
    /// run; if one of them is already used, a fresh run is allocated,
    /// `move_data(old_offset, new_offset, old_size)` is invoked so the owner
    /// can copy the payload, and the old run is freed. Shrinking clears the
    /// trailing units and keeps the offset. Equal unit counts are a no-op.
    pub fn reallocate<F>(
        &self,
        table: &mut [u32],
        offset: u32,
        old_size: u32,
        new_size: u32,
        move_data: F,
    ) -> Result<u32>
    where
        F: FnOnce(u32, u32, u32) -> Result<()>,
    {
        let allocated = self.sectors_for(old_size);
        let required = self.sectors_for(new_size);

        if required > allocated && !self.try_expand(table, offset, allocated, required) {
            let new_offset = self.allocate(table, new_size)?;
            move_data(offset, new_offset, old_size)?;
            self.free(table, offset, old_size);
            return Ok(new_offset);
        }

        if required < allocated {
            let first = self.unit_of(offset);
            for unit in first + required..first + allocated {
                Self::clear(table, unit);
            }
        }

        Ok(offset)
    }

    fn try_expand(&self, table: &mut [u32], offset: u32, allocated: u32, required: u32) -> bool {
        let first = self.unit_of(offset);
        let capacity = table.len() as u32 * WORD_BITS;

        if first + required > capacity {
            return false;
        }

        for unit in first + allocated..first + required {
            if Self::is_set(table, unit) {
                return false;
            }
        }

        for unit in first + allocated..first + required {
            Self::set(table, unit);
        }

        true
    }

    /// Clear the units backing an allocation.
    pub fn free(&self, table: &mut [u32], offset: u32, size: u32) {
        let first = self.unit_of(offset);

        for unit in first..first + self.sectors_for(size) {
            if !Self::is_set(table, unit) {
                warn!(unit, "double-free detected in allocation table");
                continue;
            }
            Self::clear(table, unit);
        }
    }
}
