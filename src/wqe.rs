//! WQE (Work Queue Element) segment layout.
//!
//! A posted descriptor is a fixed sequence of 16-byte segments written
//! directly into a send-ring slot. This crate emits the non-inline RDMA
//! WRITE shape: control, remote address, data — 48 bytes, `ds` = 3.

use bitflags::bitflags;

/// Control Segment (16 bytes).
///
/// First segment of every WQE. Its leading 8 bytes are also what gets
/// copied to the trigger register to start processing.
pub struct CtrlSeg;

impl CtrlSeg {
    /// Size of the control segment in bytes.
    pub const SIZE: usize = 16;

    /// Write the control segment to the given pointer.
    ///
    /// `wqe_idx` is the low 16 bits of the producer index; `ds_cnt` is the
    /// total descriptor size in 16-byte units.
    ///
    /// # Safety
    /// The pointer must point to at least 16 bytes of writable memory.
    #[inline]
    pub unsafe fn write(
        ptr: *mut u8,
        opcode: u8,
        wqe_idx: u16,
        qpn: u32,
        ds_cnt: u8,
        fm_ce_se: u8,
        imm: u32,
    ) {
        let opmod_idx_opcode = ((wqe_idx as u32) << 8) | (opcode as u32);
        let qpn_ds = (qpn << 8) | (ds_cnt as u32);

        let ptr32 = ptr as *mut u32;
        std::ptr::write_volatile(ptr32, opmod_idx_opcode.to_be());
        std::ptr::write_volatile(ptr32.add(1), qpn_ds.to_be());
        std::ptr::write_volatile(ptr.add(8), 0); // signature
        std::ptr::write_volatile(ptr.add(9), 0);
        std::ptr::write_volatile(ptr.add(10), 0);
        std::ptr::write_volatile(ptr.add(11), fm_ce_se);
        std::ptr::write_volatile(ptr32.add(3), imm.to_be());
    }

    /// Read the leading 8 bytes, the portion the device fetches from the
    /// trigger register to begin processing.
    ///
    /// # Safety
    /// The pointer must point to a written control segment.
    #[inline]
    pub unsafe fn head(ptr: *const u8) -> u64 {
        std::ptr::read_volatile(ptr as *const u64)
    }
}

/// Remote Address Segment (16 bytes).
///
/// Present for RDMA WRITE and RDMA READ operations.
pub struct RdmaSeg;

impl RdmaSeg {
    /// Size of the remote address segment in bytes.
    pub const SIZE: usize = 16;

    /// Write the remote address segment to the given pointer.
    ///
    /// # Safety
    /// The pointer must point to at least 16 bytes of writable memory.
    #[inline]
    pub unsafe fn write(ptr: *mut u8, remote_addr: u64, rkey: u32) {
        let ptr64 = ptr as *mut u64;
        let ptr32 = ptr.add(8) as *mut u32;
        std::ptr::write_volatile(ptr64, remote_addr.to_be());
        std::ptr::write_volatile(ptr32, rkey.to_be());
        std::ptr::write_volatile(ptr32.add(1), 0);
    }
}

/// Data Segment / SGE (16 bytes).
///
/// Points at the local buffer the device gathers from.
pub struct DataSeg;

impl DataSeg {
    /// Size of the data segment in bytes.
    pub const SIZE: usize = 16;

    /// Write the data segment to the given pointer.
    ///
    /// # Safety
    /// The pointer must point to at least 16 bytes of writable memory.
    #[inline]
    pub unsafe fn write(ptr: *mut u8, byte_count: u32, lkey: u32, addr: u64) {
        let ptr32 = ptr as *mut u32;
        let ptr64 = ptr.add(8) as *mut u64;
        std::ptr::write_volatile(ptr32, byte_count.to_be());
        std::ptr::write_volatile(ptr32.add(1), lkey.to_be());
        std::ptr::write_volatile(ptr64, addr.to_be());
    }
}

/// WQE opcodes.
///
/// For requester completions the original opcode is echoed back in bits
/// [31:24] of the completion record's `sop_drop_qpn` field.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WqeOpcode {
    SendInval = 0x01,
    RdmaWrite = 0x08,
    RdmaWriteImm = 0x09,
    Send = 0x0A,
    SendImm = 0x0B,
    RdmaRead = 0x10,
}

bitflags! {
    /// WQE flags for the control segment's `fm_ce_se` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WqeFlags: u8 {
        /// Fence (wait for previous WQEs to complete).
        const FENCE = 0x40;
        /// Completion requested.
        const COMPLETION = 0x08;
        /// Solicited event.
        const SOLICITED = 0x02;
    }
}

/// Total size of the non-inline RDMA WRITE descriptor.
pub const RDMA_WRITE_WQE_SIZE: usize = CtrlSeg::SIZE + RdmaSeg::SIZE + DataSeg::SIZE;

/// `ds` value for the non-inline RDMA WRITE descriptor (16-byte units).
pub const RDMA_WRITE_DS_CNT: u8 = (RDMA_WRITE_WQE_SIZE / 16) as u8;

/// Handle to a posted WQE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WqeHandle {
    /// WQE index in the send ring (low 16 bits of the producer index).
    pub wqe_idx: u16,
    /// WQE size in bytes.
    pub size: usize,
}
