//! Memory barrier macros for the hardware/software ring handshake.
//!
//! The completion ring and the send ring are plain memory shared with the
//! NIC; ordering between the CPU's loads/stores and the device's DMA is
//! established only by these barriers and the ownership-bit protocol.

/// Flush Write Combining buffer.
///
/// Issued after the descriptor segments are written and before the trigger
/// register store, and again after the trigger store itself, so the device
/// never observes a trigger for a partially visible descriptor.
/// On x86_64, issues `sfence`. On ARM64, uses `dsb st`.
/// Equivalent to rdma-core's `mmio_flush_writes()`.
macro_rules! mmio_flush_writes {
    () => {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            std::arch::x86_64::_mm_sfence();
        }
        #[cfg(target_arch = "x86")]
        unsafe {
            std::arch::x86::_mm_sfence();
        }
        #[cfg(target_arch = "aarch64")]
        unsafe {
            std::arch::asm!("dsb st", options(nostack, preserves_flags));
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
        {
            std::sync::atomic::fence(std::sync::atomic::Ordering::Release);
        }
    };
}

/// Load barrier for device reads.
///
/// Issued after the completion record's ownership bit has been validated
/// and before any other field of the record is read. The device may still
/// be writing adjacent fields when the ownership bit becomes visible; this
/// barrier keeps the field loads from being reordered ahead of the check.
/// On x86/x86_64 a compiler barrier suffices (TSO guarantees load-load
/// ordering). On ARM an explicit `dmb ld` is required.
/// Equivalent to rdma-core's `udma_from_device_barrier()`.
macro_rules! udma_from_device_barrier {
    () => {
        #[cfg(target_arch = "aarch64")]
        unsafe {
            std::arch::asm!("dmb ld", options(nostack, preserves_flags));
        }
        #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
        {
            std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::Acquire);
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
        {
            std::sync::atomic::fence(std::sync::atomic::Ordering::Acquire);
        }
    };
}
