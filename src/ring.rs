//! Shared ring-buffer layout.
//!
//! Both queues are contiguous buffers shared read/write with the device,
//! divided into `entry_cnt` fixed-size slots. Software addresses a slot by
//! a monotonically increasing index; because `entry_cnt` is a power of two
//! the ring position is computed with a mask rather than a modulo.

use crate::error::{Error, Result};

/// Fixed layout of one hardware ring: base address, slot count, stride.
///
/// `RingBuf` is pure address arithmetic; the mutable consumer/producer
/// index lives in the component that owns the ring. Raw pointers never
/// escape this type except as slot addresses handed to the owning
/// component's decode/emit routines.
pub(crate) struct RingBuf {
    /// Ring buffer base address.
    buf: *mut u8,
    /// Number of slots (power of 2).
    entry_cnt: u32,
    /// Bytes per slot.
    stride: u32,
}

impl RingBuf {
    /// Create a ring view over device-shared memory.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRingSize`] unless `entry_cnt` is a nonzero
    /// power of two.
    ///
    /// # Safety
    /// `buf` must point to at least `entry_cnt * stride` bytes that stay
    /// valid and exclusively shared with the device for the lifetime of
    /// the ring.
    pub(crate) unsafe fn new(buf: *mut u8, entry_cnt: u32, stride: u32) -> Result<Self> {
        if entry_cnt == 0 || !entry_cnt.is_power_of_two() {
            return Err(Error::InvalidRingSize { entry_cnt });
        }
        debug_assert!(!buf.is_null());
        debug_assert!(stride > 0);
        Ok(Self {
            buf,
            entry_cnt,
            stride,
        })
    }

    /// Number of slots in the ring.
    #[inline]
    pub(crate) fn entry_cnt(&self) -> u32 {
        self.entry_cnt
    }

    /// Slot address for a monotonically increasing index.
    ///
    /// The ring position is `idx & (entry_cnt - 1)`.
    #[inline]
    pub(crate) fn slot_ptr(&self, idx: u32) -> *mut u8 {
        let pos = idx & (self.entry_cnt - 1);
        unsafe { self.buf.add((pos as usize) * (self.stride as usize)) }
    }
}
