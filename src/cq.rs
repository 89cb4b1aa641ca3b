//! Completion ring consumption.
//!
//! The device reports outcomes of posted work by writing 64-byte
//! completion records into a ring shared with software. [`CompletionRing`]
//! owns the consumer side: it validates a slot with the invalid-opcode
//! pre-check and the ownership/polarity test, decodes the record behind a
//! load barrier, and publishes the advanced consumer index back to the
//! device through the doorbell word.

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::ring::RingBuf;
use crate::wqe::WqeOpcode;

/// Sentinel opcode marking a slot the device has not written this lap.
const CQE_OPCODE_INVALID: u8 = 0x0f;

/// Completion record size variants.
///
/// With 128-byte slots the record occupies the second 64 bytes; the first
/// 64 are a reserved compressed/extended format this design never consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqeSize {
    /// 64-byte completion records.
    Size64,
    /// 128-byte slots with the record in the upper half.
    Size128,
}

impl CqeSize {
    /// Slot stride in bytes.
    #[inline]
    pub fn stride(self) -> u32 {
        match self {
            CqeSize::Size64 => 64,
            CqeSize::Size128 => 128,
        }
    }
}

/// Completion ring configuration.
#[derive(Debug, Clone)]
pub struct CqConfig {
    /// Slot size of the completion ring.
    pub cqe_size: CqeSize,
    /// Wall-clock ceiling for [`CompletionRing::poll`].
    pub poll_timeout: Duration,
}

impl Default for CqConfig {
    fn default() -> Self {
        Self {
            cqe_size: CqeSize::Size64,
            poll_timeout: Duration::from_millis(5000),
        }
    }
}

/// Completion ring construction parameters.
///
/// All values come from the control-plane layer that created the queue.
#[derive(Debug, Clone)]
pub struct CqInfo {
    /// Ring buffer base address.
    pub buf: *mut u8,
    /// Number of slots (power of 2).
    pub cqe_cnt: u32,
    /// Doorbell word the consumer index is published through.
    pub dbrec: *mut u32,
}

// =============================================================================
// CQE decode
// =============================================================================

/// CQE opcode values (bits [7:4] of `op_own`).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqeOpcode {
    /// Requester completion (posted work finished).
    Req = 0x00,
    /// Responder RDMA write with immediate.
    RespRdmaWriteImm = 0x01,
    /// Responder send.
    RespSend = 0x02,
    /// Responder send with immediate.
    RespSendImm = 0x03,
    /// Responder send with invalidate.
    RespSendInv = 0x04,
    /// Requester error.
    ReqErr = 0x0d,
    /// Responder error.
    RespErr = 0x0e,
}

impl CqeOpcode {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::Req),
            0x01 => Some(Self::RespRdmaWriteImm),
            0x02 => Some(Self::RespSend),
            0x03 => Some(Self::RespSendImm),
            0x04 => Some(Self::RespSendInv),
            0x0d => Some(Self::ReqErr),
            0x0e => Some(Self::RespErr),
            _ => None,
        }
    }
}

/// Raw decoded completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cqe {
    /// Operation code.
    pub opcode: CqeOpcode,
    /// WQE counter echoed from the posted descriptor.
    pub wqe_counter: u16,
    /// Queue number (low 24 bits of `sop_drop_qpn`).
    pub qp_num: u32,
    /// Original send opcode for requester completions
    /// (bits [31:24] of `sop_drop_qpn`).
    pub sop: u8,
    /// Transferred byte count.
    pub byte_cnt: u32,
    /// Immediate data (or invalidated rkey).
    pub imm: u32,
    /// Error syndrome (0 = success).
    pub syndrome: u8,
}

impl Cqe {
    /// Decode a completion record from raw memory.
    ///
    /// Pure volatile reads; no software state changes, so re-reading the
    /// same slot yields the same record until the device rewrites it.
    ///
    /// # Safety
    /// The pointer must point to a valid 64-byte completion record.
    ///
    /// CQE64 layout:
    /// - offset 36: imm_inval_pkey (4B, big-endian)
    /// - offset 44: byte_cnt (4B, big-endian)
    /// - offset 55: syndrome (1B)
    /// - offset 56: sop_drop_qpn (4B, big-endian) - QP number in [23:0]
    /// - offset 60: wqe_counter (2B, big-endian)
    /// - offset 63: op_own (1B) - opcode[7:4] | owner_bit[0]
    pub unsafe fn from_ptr(ptr: *const u8) -> Option<Self> {
        let op_own = std::ptr::read_volatile(ptr.add(63));
        let opcode = CqeOpcode::from_u8(op_own >> 4)?;

        let wqe_counter = u16::from_be(std::ptr::read_volatile(ptr.add(60) as *const u16));

        let sop_drop_qpn = u32::from_be(std::ptr::read_volatile(ptr.add(56) as *const u32));
        let qp_num = sop_drop_qpn & 0x00FF_FFFF;
        let sop = (sop_drop_qpn >> 24) as u8;

        let byte_cnt = u32::from_be(std::ptr::read_volatile(ptr.add(44) as *const u32));

        let imm = u32::from_be(std::ptr::read_volatile(ptr.add(36) as *const u32));

        let syndrome = std::ptr::read_volatile(ptr.add(55));

        Some(Self {
            opcode,
            wqe_counter,
            qp_num,
            sop,
            byte_cnt,
            imm,
            syndrome,
        })
    }
}

// =============================================================================
// Completion outcome
// =============================================================================

/// User-facing operation kind of a completed work request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// SEND family (send, send-with-immediate, send-with-invalidate).
    Send,
    /// RDMA WRITE family.
    RdmaWrite,
    /// RDMA READ.
    RdmaRead,
    /// Inbound receive.
    Recv,
    /// Inbound RDMA write with immediate.
    RecvRdmaWithImm,
}

/// Completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Operation executed successfully.
    Success,
    /// Device reported a failure; only the syndrome is trustworthy.
    Error {
        /// Error syndrome from the record.
        syndrome: u8,
    },
}

/// Decoded outcome of one completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Operation kind; `None` for error completions, which are not
    /// decoded further.
    pub kind: Option<CompletionKind>,
    /// Success or device-reported failure.
    pub status: CompletionStatus,
    /// Queue number the completion belongs to.
    pub qpn: u32,
    /// WQE counter echoed from the posted descriptor.
    pub wqe_counter: u16,
    /// Transferred byte count (0 for error completions).
    pub byte_cnt: u32,
    /// Immediate value, present for the responder with-immediate classes.
    pub imm: Option<u32>,
    /// Whether the operation carried an immediate, including requester
    /// completions whose record does not hold the value itself.
    pub with_immediate: bool,
}

impl Completion {
    /// Whether the operation executed successfully.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == CompletionStatus::Success
    }

    /// Convert a device-reported failure into [`Error::CompletionFailure`].
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            CompletionStatus::Success => Ok(self),
            CompletionStatus::Error { syndrome } => Err(Error::CompletionFailure {
                syndrome,
                qpn: self.qpn,
            }),
        }
    }

    /// Classify a raw record into a completion outcome.
    fn from_cqe(cqe: Cqe) -> Self {
        match cqe.opcode {
            CqeOpcode::Req => {
                // Requester side: the original opcode rides in sop.
                let (kind, with_imm) = match cqe.sop {
                    x if x == WqeOpcode::RdmaWrite as u8 => (CompletionKind::RdmaWrite, false),
                    x if x == WqeOpcode::RdmaWriteImm as u8 => (CompletionKind::RdmaWrite, true),
                    x if x == WqeOpcode::Send as u8 => (CompletionKind::Send, false),
                    x if x == WqeOpcode::SendImm as u8 => (CompletionKind::Send, true),
                    x if x == WqeOpcode::SendInval as u8 => (CompletionKind::Send, false),
                    x if x == WqeOpcode::RdmaRead as u8 => (CompletionKind::RdmaRead, false),
                    _ => (CompletionKind::Send, false),
                };
                Completion {
                    kind: Some(kind),
                    status: CompletionStatus::Success,
                    qpn: cqe.qp_num,
                    wqe_counter: cqe.wqe_counter,
                    byte_cnt: cqe.byte_cnt,
                    imm: None,
                    with_immediate: with_imm,
                }
            }
            CqeOpcode::RespSend | CqeOpcode::RespSendInv => Completion {
                kind: Some(CompletionKind::Recv),
                status: CompletionStatus::Success,
                qpn: cqe.qp_num,
                wqe_counter: cqe.wqe_counter,
                byte_cnt: cqe.byte_cnt,
                imm: None,
                with_immediate: false,
            },
            CqeOpcode::RespSendImm => Completion {
                kind: Some(CompletionKind::Recv),
                status: CompletionStatus::Success,
                qpn: cqe.qp_num,
                wqe_counter: cqe.wqe_counter,
                byte_cnt: cqe.byte_cnt,
                imm: Some(cqe.imm),
                with_immediate: true,
            },
            CqeOpcode::RespRdmaWriteImm => Completion {
                kind: Some(CompletionKind::RecvRdmaWithImm),
                status: CompletionStatus::Success,
                qpn: cqe.qp_num,
                wqe_counter: cqe.wqe_counter,
                byte_cnt: cqe.byte_cnt,
                imm: Some(cqe.imm),
                with_immediate: true,
            },
            CqeOpcode::ReqErr | CqeOpcode::RespErr => Completion {
                // Length and immediate are unreliable on the error path.
                kind: None,
                status: CompletionStatus::Error {
                    syndrome: cqe.syndrome,
                },
                qpn: cqe.qp_num,
                wqe_counter: cqe.wqe_counter,
                byte_cnt: 0,
                imm: None,
                with_immediate: false,
            },
        }
    }
}

// =============================================================================
// Completion Ring
// =============================================================================

/// Consumer side of a completion ring.
///
/// Owns the monotonically increasing consumer index. Designed for exactly
/// one software agent; the only concurrency is with the device, resolved
/// by the ownership/polarity protocol and the barrier macros.
pub struct CompletionRing {
    ring: RingBuf,
    /// Doorbell word for publishing the consumer index.
    dbrec: *mut u32,
    /// Consumer index (monotonically increasing).
    ci: u32,
    cqe_size: CqeSize,
    poll_timeout: Duration,
}

impl CompletionRing {
    /// Create the consumer side of a completion ring.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRingSize`] unless `cqe_cnt` is a nonzero
    /// power of two.
    ///
    /// # Safety
    /// `info.buf` must point to the ring created by the control plane
    /// (`cqe_cnt * cqe_size.stride()` bytes) and `info.dbrec` to its
    /// doorbell word; both must stay valid for the ring's lifetime, and
    /// no other software agent may consume from this ring.
    pub unsafe fn new(info: CqInfo, config: &CqConfig) -> Result<Self> {
        let ring = RingBuf::new(info.buf, info.cqe_cnt, config.cqe_size.stride())?;
        debug!(
            "completion ring: {} slots of {} bytes, timeout {:?}",
            info.cqe_cnt,
            config.cqe_size.stride(),
            config.poll_timeout
        );
        Ok(Self {
            ring,
            dbrec: info.dbrec,
            ci: 0,
            cqe_size: config.cqe_size,
            poll_timeout: config.poll_timeout,
        })
    }

    /// Current consumer index.
    #[inline]
    pub fn consumer_index(&self) -> u32 {
        self.ci
    }

    /// Try to consume one completion record. Non-blocking, single attempt.
    ///
    /// Returns `Ok(None)` when the ring holds no fresh record for the
    /// current lap: either the slot's opcode is the invalid sentinel or
    /// its ownership bit does not match the expected polarity. Neither
    /// case advances the index or touches the doorbell.
    ///
    /// On success the consumer index advances by one and its low 24 bits
    /// are published to the doorbell word, after every record.
    ///
    /// # Errors
    /// [`Error::UnrecognizedCompletion`] for an opcode outside the known
    /// set on a slot that passed the ownership test. The index is advanced
    /// and published past the record so the consumer cannot stall on it.
    pub fn try_consume_one(&mut self) -> Result<Option<Completion>> {
        let slot = self.ring.slot_ptr(self.ci);
        // With 128-byte slots the record sits in the upper half.
        let cqe_ptr = match self.cqe_size {
            CqeSize::Size64 => slot,
            CqeSize::Size128 => unsafe { slot.add(64) },
        };

        let op_own = unsafe { std::ptr::read_volatile(cqe_ptr.add(63)) };

        // Cheap pre-check before the authoritative ownership test.
        if (op_own >> 4) == CQE_OPCODE_INVALID {
            return Ok(None);
        }

        // Ownership/polarity: expected flips every full lap of the ring.
        let sw_owner = (self.ci & self.ring.entry_cnt()) != 0;
        let hw_owner = (op_own & 1) != 0;
        if sw_owner != hw_owner {
            return Ok(None);
        }

        // No field may be read before the ownership check is settled.
        udma_from_device_barrier!();

        let Some(cqe) = (unsafe { Cqe::from_ptr(cqe_ptr) }) else {
            let opcode = op_own >> 4;
            warn!(
                "unrecognized completion opcode 0x{:x} at consumer index {}",
                opcode, self.ci
            );
            self.advance();
            return Err(Error::UnrecognizedCompletion { opcode });
        };

        self.advance();
        Ok(Some(Completion::from_cqe(cqe)))
    }

    /// Poll until a completion is consumed or the configured wall-clock
    /// ceiling elapses. Pure spin, no yielding.
    ///
    /// # Errors
    /// [`Error::Timeout`] if no record was observed in time;
    /// [`Error::UnrecognizedCompletion`] propagated from decode. A
    /// device-reported failure is returned as a normal [`Completion`]
    /// with error status — use [`Completion::into_result`] to fold it
    /// into the error taxonomy.
    pub fn poll(&mut self) -> Result<Completion> {
        let start = Instant::now();
        loop {
            if let Some(completion) = self.try_consume_one()? {
                return Ok(completion);
            }
            if start.elapsed() >= self.poll_timeout {
                return Err(Error::Timeout);
            }
        }
    }

    /// Advance the consumer index and publish it to the doorbell word.
    ///
    /// Only the low 24 bits are published (device addressing limit),
    /// big-endian, telling the device the slot just consumed may be
    /// reused once this lap recycles.
    fn advance(&mut self) {
        self.ci = self.ci.wrapping_add(1);
        mmio_flush_writes!();
        unsafe {
            std::ptr::write_volatile(self.dbrec, (self.ci & 0x00FF_FFFF).to_be());
        }
    }
}
