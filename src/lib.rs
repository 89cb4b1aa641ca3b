//! # mlx5-fastpath - Direct ring access for mlx5 send and completion queues
//!
//! This crate implements the fast-path synchronization protocol between an
//! mlx5-class NIC and host software, bypassing the vendor's generic
//! posting/polling entry points: descriptors are written straight into the
//! send ring and handed to the device through its trigger register, and
//! completion records are decoded straight out of the completion ring.
//!
//! ## Design Philosophy
//!
//! ### Two rings, two cursors
//!
//! The device and software never lock against each other. Each side owns
//! exactly one cursor into each shared ring:
//!
//! - **Completion ring**: the device produces 64-byte completion records;
//!   software consumes them, guided by the per-slot ownership bit whose
//!   expected polarity flips every full lap. [`CompletionRing`] owns the
//!   consumer index and publishes it back through the doorbell word.
//! - **Send ring**: software produces fixed-layout descriptors;
//!   [`SendRing`] owns the producer index and provokes processing by
//!   storing the descriptor's first 8 bytes to the trigger register,
//!   alternating between the two halves of the trigger region.
//!
//! Consistency rests entirely on the ownership/polarity convention and
//! the explicit memory barriers in `barrier` — plain volatile loads and
//! stores otherwise.
//!
//! ### No control plane
//!
//! Device discovery, protection domains, memory registration, and queue
//! pair activation are someone else's job. Ring base addresses, entry
//! counts, strides, the doorbell word, and the trigger register arrive as
//! plain construction parameters ([`CqInfo`], [`SqInfo`]); nothing here
//! links against a verbs library.
//!
//! ### Single agent per queue pair
//!
//! Both components assume one serialized software agent. There is no
//! internal locking and no atomics beyond barrier-ordered plain accesses;
//! sharing a queue pair across threads requires external serialization.
//!
//! ## Module Overview
//!
//! - [`cq`]: completion ring consumption and record classification
//! - [`sq`]: send ring descriptor construction and trigger sequencing
//! - [`wqe`]: descriptor segment layout
//! - [`error`]: error taxonomy
//! - [`test_utils`]: simulated-ring helpers for tests and benchmarks

#![allow(unsafe_op_in_unsafe_fn)]

#[macro_use]
mod barrier;

pub mod cq;
pub mod error;
mod ring;
pub mod sq;
pub mod test_utils;
pub mod wqe;

pub use cq::{
    Completion, CompletionKind, CompletionRing, CompletionStatus, CqConfig, CqInfo, Cqe,
    CqeOpcode, CqeSize,
};
pub use error::{Error, Result};
pub use sq::{SendRing, SqInfo};
pub use wqe::{WqeFlags, WqeHandle, WqeOpcode};
