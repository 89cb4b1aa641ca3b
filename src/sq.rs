//! Send ring posting.
//!
//! [`SendRing`] owns the producer side of a send queue: it lays out a
//! fixed 3-segment RDMA WRITE descriptor in the next ring slot and hands
//! it to the device by storing the descriptor's first 8 bytes into the
//! trigger register, alternating between the two halves of the trigger
//! region on successive posts so back-to-back triggers never race on
//! write-combining flush order.

use log::debug;

use crate::error::{Error, Result};
use crate::ring::RingBuf;
use crate::wqe::{
    CtrlSeg, DataSeg, RdmaSeg, WqeFlags, WqeHandle, WqeOpcode, RDMA_WRITE_DS_CNT,
    RDMA_WRITE_WQE_SIZE,
};

/// Send ring construction parameters.
///
/// All values come from the control-plane layer that created and
/// activated the queue pair.
#[derive(Debug, Clone)]
pub struct SqInfo {
    /// Send ring buffer base address.
    pub buf: *mut u8,
    /// Number of slots (power of 2).
    pub wqe_cnt: u32,
    /// Bytes per slot.
    pub stride: u32,
    /// Queue number stamped into every control segment.
    pub sqn: u32,
    /// Trigger register base address.
    pub trigger_reg: *mut u8,
    /// Size of one half of the trigger region; successive posts
    /// alternate between offset 0 and this offset.
    pub trigger_size: u32,
}

/// Producer side of a send ring.
///
/// Owns the monotonically increasing producer index and the trigger
/// offset. Designed for exactly one software agent; once the trigger
/// store is issued the descriptor is irrevocably the device's.
pub struct SendRing {
    ring: RingBuf,
    /// Queue number for control segments.
    sqn: u32,
    /// Producer index (monotonically increasing).
    pi: u32,
    /// Completions the caller has observed for this queue.
    ci: u32,
    /// Trigger register base.
    trigger_reg: *mut u8,
    /// Half-size of the trigger region.
    trigger_size: u32,
    /// Current trigger offset (alternates between 0 and trigger_size).
    trigger_offset: u32,
}

impl SendRing {
    /// Create the producer side of a send ring.
    ///
    /// # Errors
    /// [`Error::InvalidRingSize`] unless `wqe_cnt` is a nonzero power of
    /// two; [`Error::DescriptorTooLarge`] if the 48-byte descriptor does
    /// not fit the slot stride.
    ///
    /// # Safety
    /// `info.buf` must point to the send ring created by the control
    /// plane (`wqe_cnt * stride` bytes) and `info.trigger_reg` to its
    /// trigger register window of `2 * trigger_size` bytes; both must
    /// stay valid for the ring's lifetime, and no other software agent
    /// may post to this ring.
    pub unsafe fn new(info: SqInfo) -> Result<Self> {
        if RDMA_WRITE_WQE_SIZE > info.stride as usize {
            return Err(Error::DescriptorTooLarge {
                size: RDMA_WRITE_WQE_SIZE,
                stride: info.stride,
            });
        }
        let ring = RingBuf::new(info.buf, info.wqe_cnt, info.stride)?;
        debug!(
            "send ring: {} slots of {} bytes, QP 0x{:x}, trigger half {}",
            info.wqe_cnt, info.stride, info.sqn, info.trigger_size
        );
        Ok(Self {
            ring,
            sqn: info.sqn,
            pi: 0,
            ci: 0,
            trigger_reg: info.trigger_reg,
            trigger_size: info.trigger_size,
            trigger_offset: 0,
        })
    }

    /// Current producer index.
    #[inline]
    pub fn producer_index(&self) -> u32 {
        self.pi
    }

    /// Trigger offset the next post will use.
    #[inline]
    pub fn trigger_offset(&self) -> u32 {
        self.trigger_offset
    }

    /// Number of free descriptor slots.
    #[inline]
    pub fn available(&self) -> u32 {
        self.ring.entry_cnt() - self.pi.wrapping_sub(self.ci)
    }

    /// Record `count` harvested completions for this queue.
    ///
    /// The caller invokes this as it consumes matching completion records,
    /// freeing their slots for reuse; outstanding-work tracking beyond
    /// this bookkeeping stays with the caller.
    pub fn mark_completed(&mut self, count: u32) {
        self.ci = self.ci.wrapping_add(count);
    }

    /// Post one non-inline RDMA WRITE descriptor and trigger processing.
    ///
    /// Lays out control, remote address, and data segments in the next
    /// slot, requests a completion unconditionally, and hands the
    /// descriptor to the device with a single volatile 8-byte store of
    /// the control segment head to the current trigger offset. A
    /// completion for this queue number will eventually appear in the
    /// paired completion ring.
    ///
    /// `local_addr` is the caller's registered-buffer address (base plus
    /// offset into the region).
    ///
    /// # Errors
    /// [`Error::QueueFull`] when every slot holds a descriptor whose
    /// completion has not been marked via [`SendRing::mark_completed`].
    ///
    /// # Safety
    /// `local_addr..local_addr+len` must lie in a memory region
    /// registered with `lkey`, and `remote_addr..remote_addr+len` in one
    /// registered with `rkey` and remote-write access; the device DMAs
    /// through both.
    pub unsafe fn post_rdma_write(
        &mut self,
        local_addr: u64,
        len: u32,
        lkey: u32,
        remote_addr: u64,
        rkey: u32,
    ) -> Result<WqeHandle> {
        if self.available() == 0 {
            return Err(Error::QueueFull);
        }

        let wqe_ptr = self.ring.slot_ptr(self.pi);
        // The control segment only carries the low 16 bits; the full
        // counter keeps addressing the ring.
        let pi16 = (self.pi & 0xFFFF) as u16;

        CtrlSeg::write(
            wqe_ptr,
            WqeOpcode::RdmaWrite as u8,
            pi16,
            self.sqn,
            RDMA_WRITE_DS_CNT,
            WqeFlags::COMPLETION.bits(),
            0,
        );
        RdmaSeg::write(wqe_ptr.add(CtrlSeg::SIZE), remote_addr, rkey);
        DataSeg::write(
            wqe_ptr.add(CtrlSeg::SIZE + RdmaSeg::SIZE),
            len,
            lkey,
            local_addr,
        );

        // The device may read the slot as soon as it observes the trigger;
        // every segment store must be visible first.
        mmio_flush_writes!();

        let trigger = self.trigger_reg.add(self.trigger_offset as usize) as *mut u64;
        std::ptr::write_volatile(trigger, CtrlSeg::head(wqe_ptr));

        mmio_flush_writes!();

        self.pi = self.pi.wrapping_add(1);
        self.trigger_offset ^= self.trigger_size;

        Ok(WqeHandle {
            wqe_idx: pi16,
            size: RDMA_WRITE_WQE_SIZE,
        })
    }
}
