//! # Streaming Debug IP Driver Library
//!
//! This crate drives the FPGA-resident streaming debug IP through a
//! memory-mapped interface: it stages outbound payloads into the hardware's
//! receive windows, tracks in-flight descriptors, reclaims window space as
//! the hardware signals completion, and decodes inbound completions into a
//! stream of framed records.
//!
//! ## Architecture
//!
//! The crate is built around three seams:
//!
//! - **[`mmio::Mmio`]**: the accessor boundary. The engine only ever holds
//!   (implementation, byte offset) pairs; the volatile mapping itself lives
//!   in whatever platform crate implements the trait. A byte-vector
//!   [`swmodel::SwModel`] implementation ships here for tests.
//! - **[`DebugLink`]**: the callback table a transport layer consumes. The
//!   engine implements it; a TCP server (or anything else multiplexing
//!   remote clients onto the four channels) calls through it and needs no
//!   knowledge of registers or rings.
//! - **[`irq::EventSource`]**: the hardware event source the interrupt
//!   delivery thread blocks on, injected at construction.
//!
//! Behind those seams, [`engine::StreamDbgIp`] ties together the per-channel
//! window allocators ([`ring::RingAllocator`]), the descriptor-slot
//! bookkeeping ([`slots::SlotTracker`]) and the packed register words from
//! [`streamdbg_protocol`].
//!
//! ## How a transfer flows
//!
//! Outbound: `get_outbound_buffer` → bulk-copy the payload behind the
//! granted offset → `outbound_submitted`. Inbound: `acquire_inbound` →
//! bulk-copy the payload out → `inbound_complete`. All four calls are
//! non-blocking; a `None` from the buffer or acquire paths means "retry
//! later" and is never an error.
//!
//! ## Concurrency model
//!
//! Exactly two threads touch driver state: the caller thread and the
//! interrupt delivery thread. The delivery thread shares nothing with the
//! engine beyond its own flags and wake primitive, so engine operations
//! take `&mut self` and rely on the caller for per-channel serialization
//! instead of carrying locks.
//!
//! ## Bring-up
//!
//! ```
//! use streamdbg_driver::engine::{DesignInfo, StreamDbgIp};
//! use streamdbg_driver::mmio::Mmio;
//! use streamdbg_driver::swmodel::SwModel;
//! use streamdbg_protocol::csr;
//!
//! let model = SwModel::new(0x4000);
//! // Only a device with the supported identity comes up.
//! model.write_64(
//!     csr::config::TYPE,
//!     u64::from(csr::SUPPORTED_TYPE) | (u64::from(csr::SUPPORTED_VERSION) << 32),
//! );
//! model.write_64(csr::h2t::AVAILABLE_SLOTS, 128);
//! model.write_64(csr::mgmt::AVAILABLE_SLOTS, 128);
//!
//! let mut ip = StreamDbgIp::new(model);
//! ip.set_design_info(DesignInfo::with_data_windows(4096));
//! ip.init().expect("software model reports the supported identity");
//! ```
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics. Transfer paths log at
//! `trace`, bring-up at `info`/`debug`, and fatal interrupt-thread
//! conditions at `error`. Configure logging with an implementation like
//! `env_logger`.

pub mod engine;
pub mod error;
pub mod irq;
pub mod mmio;
pub mod ring;
pub mod slots;
pub mod swmodel;

use error::InitError;
use streamdbg_protocol::{InboundChannel, OutboundChannel, PacketHeader};

/// The callback table a transport layer drives the debug IP through.
///
/// This is the complete surface the network/server layer above needs: it
/// must not assume anything about the registers or window geometry behind
/// it, and the driver must not assume anything about how many remote
/// clients are multiplexed on top. All methods are non-blocking.
///
/// The buffer/submit and acquire/complete pairs must be called in order on
/// any one channel; calls on the same channel need external serialization.
pub trait DebugLink {
    /// Brings the hardware up. Must succeed before any other call.
    fn init(&mut self) -> Result<(), InitError>;

    /// Whether the design wired up the management channel pair.
    fn has_mgmt_support(&mut self) -> bool;

    /// Reads a driver parameter by name, `None` if unknown.
    fn get_param(&mut self, name: &str) -> Option<String>;

    /// Sets a driver parameter by name; returns whether the name was known.
    fn set_param(&mut self, name: &str, value: &str) -> bool;

    /// Grants a window range for an outbound payload, or `None` when the
    /// channel is saturated right now. Retry later; this is not an error.
    fn get_outbound_buffer(&mut self, channel: OutboundChannel, len: usize) -> Option<u32>;

    /// Announces that the payload behind a granted range is staged and the
    /// descriptor should be pushed to the hardware.
    fn outbound_submitted(&mut self, channel: OutboundChannel, header: &PacketHeader, payload: u32);

    /// Takes the oldest unconsumed inbound completion, or `None` when the
    /// channel is empty.
    fn acquire_inbound(&mut self, channel: InboundChannel) -> Option<(PacketHeader, u32)>;

    /// Retires the completion most recently acquired from the channel.
    /// Exactly one call per acquired record; skipping it stalls the channel.
    fn inbound_complete(&mut self, channel: InboundChannel);
}
