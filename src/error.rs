//! Error types for the ring protocol.

/// Ring protocol errors.
///
/// Only pre-flight validation, the poll ceiling, and completion decode
/// produce reportable failures; nothing is retried internally.
#[derive(Debug)]
pub enum Error {
    /// No completion was observed within the poll timeout.
    Timeout,
    /// The device reported a failed operation in a completion record.
    ///
    /// Transferred length and immediate data are not decoded on this path;
    /// the syndrome is the only trustworthy diagnostic.
    CompletionFailure {
        /// Error syndrome from the completion record.
        syndrome: u8,
        /// Queue number the failed completion belongs to.
        qpn: u32,
    },
    /// A completion record carried an opcode outside the known set.
    ///
    /// The consumer index has already been advanced past the record, so
    /// polling can make progress; this usually indicates a firmware or
    /// configuration mismatch.
    UnrecognizedCompletion {
        /// Raw opcode value (bits [7:4] of `op_own`).
        opcode: u8,
    },
    /// The send ring has no free slot for another descriptor.
    QueueFull,
    /// Ring entry count is not a nonzero power of two.
    InvalidRingSize { entry_cnt: u32 },
    /// The descriptor does not fit in one send-ring slot.
    DescriptorTooLarge { size: usize, stride: u32 },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Timeout => write!(f, "no completion within poll timeout"),
            Error::CompletionFailure { syndrome, qpn } => {
                write!(
                    f,
                    "completion with error syndrome 0x{:02x} on QP 0x{:x}",
                    syndrome, qpn
                )
            }
            Error::UnrecognizedCompletion { opcode } => {
                write!(f, "unrecognized completion opcode 0x{:x}", opcode)
            }
            Error::QueueFull => write!(f, "send ring is full"),
            Error::InvalidRingSize { entry_cnt } => {
                write!(f, "ring entry count {} is not a power of two", entry_cnt)
            }
            Error::DescriptorTooLarge { size, stride } => {
                write!(
                    f,
                    "descriptor of {} bytes does not fit slot stride {}",
                    size, stride
                )
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for ring protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
