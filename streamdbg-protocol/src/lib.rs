//! # Streaming Debug IP Protocol Library
//!
//! This crate describes the register-level protocol of the FPGA-resident
//! streaming debug IP: the control/status register (CSR) map, the packed
//! descriptor words the host exchanges with the hardware, and the
//! packet-framing vocabulary shared by the driver and anything layered on
//! top of it.
//!
//! ## Overview
//!
//! The debug IP exposes four logical channels, each backed by a fixed memory
//! window and a bank of fixed-offset CSRs:
//!
//! - **H2T** (host to target) and **MGMT** (management request) carry
//!   outbound data; the host stages payloads into the channel window and
//!   pushes a descriptor through the CSRs.
//! - **T2H** (target to host) and **MGMT-RSP** (management response) carry
//!   inbound completions; the host decodes descriptors out of the CSRs and
//!   acknowledges each one to let the hardware advance.
//!
//! This crate is purely computational: it packs and unpacks the register
//! words bit-exactly but never touches hardware. The driver crate owns all
//! MMIO traffic.
//!
//! ## Descriptor words
//!
//! Every transfer is described by two 64-bit words:
//!
//! - the **transfer word**: payload length in the low 31 bits, the
//!   end-of-packet flag in bit 31 and the buffer offset in the high 32 bits,
//! - the **route word**: connection id in the low half and channel id in the
//!   high half (management channels carry the channel id only).
//!
//! ```
//! use streamdbg_protocol::TransferWord;
//!
//! let word = TransferWord { len: 104, eop: true, offset: 0x1000 };
//! let packed = word.pack();
//! assert_eq!(packed, 0x0000_1000_8000_0068);
//! assert_eq!(TransferWord::unpack(packed), word);
//! ```
//!
//! A transfer word whose length field is zero means "no data is pending" and
//! is never a valid descriptor:
//!
//! ```
//! use streamdbg_protocol::TransferWord;
//!
//! // The offset field of an empty word is meaningless and must be ignored.
//! assert!(TransferWord::unpack(0xDEAD_BEEF_0000_0000).is_empty());
//! ```
//!
//! ## Packet framing
//!
//! Inbound descriptors carry only an end-of-packet bit; the start-of-packet
//! flag is reconstructed by the host. [`FrameState`] tracks the single bit of
//! state this requires per inbound channel:
//!
//! ```
//! use streamdbg_protocol::FrameState;
//!
//! let mut frame = FrameState::new();
//! assert!(frame.step(false));  // first record of the stream: SOP
//! assert!(!frame.step(true));  // middle record ending the packet: EOP only
//! assert!(frame.step(false));  // next record starts a new packet: SOP again
//! ```
//!
//! ## Device identity
//!
//! The IP publishes a type and version code in its configuration CSRs. The
//! supported values are [`csr::SUPPORTED_TYPE`] and
//! [`csr::SUPPORTED_VERSION`]; a driver must refuse to touch an IP that
//! reports anything else.
//!
//! ## Thread Safety
//!
//! All types in this crate are plain data and freely shareable across
//! threads. [`FrameState`] is the only mutable state and belongs to exactly
//! one inbound channel.

pub mod csr;
pub mod descriptor;
pub use descriptor::*;
pub mod packet;
pub use packet::*;
