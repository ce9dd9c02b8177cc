//! The transfer engine: bring-up, buffer management and the register-level
//! submit/acquire paths for all four channels.

use streamdbg_protocol::{
    FrameState, InboundChannel, OutboundChannel, PacketHeader, TransferWord, aligned_len, csr,
    pack_data_route, pack_mgmt_route, unpack_route,
};

use crate::{DebugLink, error::InitError, mmio::Mmio, ring::RingAllocator, slots::SlotTracker};

/// Name of the string parameter that toggles the hardware loopback path.
pub const HW_LOOPBACK_PARAM: &str = "#HW_LOOPBACK";
/// Name of the string parameter that reports management-channel support.
pub const MGMT_SUPPORT_PARAM: &str = "#MGMT_SUPPORT";

/// Memory layout of the debug IP inside the mapped hardware interface.
///
/// All bases are byte offsets from the start of the interface. The layout is
/// fixed by the FPGA design; it must be supplied before bring-up and never
/// changes afterwards. A zero-span window disables its channel pair (designs
/// without management wiring leave both management windows empty).
#[derive(Copy, Clone, Debug)]
pub struct DesignInfo {
    pub csr_base: u32,
    pub h2t_base: u32,
    pub h2t_span: usize,
    pub t2h_base: u32,
    pub t2h_span: usize,
    pub mgmt_base: u32,
    pub mgmt_span: usize,
    pub mgmt_rsp_base: u32,
    pub mgmt_rsp_span: usize,
}

impl DesignInfo {
    /// The conventional layout: CSR block at the interface start and the two
    /// data windows stacked above it, each `data_span` bytes. Small designs
    /// keep the windows at the fixed 4 KiB / 8 KiB marks.
    pub fn with_data_windows(data_span: usize) -> DesignInfo {
        let (h2t_base, t2h_base) = if data_span > 2048 {
            (data_span as u32, 2 * data_span as u32)
        } else {
            (0x1000, 0x2000)
        };
        DesignInfo {
            csr_base: 0,
            h2t_base,
            h2t_span: data_span,
            t2h_base,
            t2h_span: data_span,
            mgmt_base: 0,
            mgmt_span: 0,
            mgmt_rsp_base: 0,
            mgmt_rsp_span: 0,
        }
    }
}

/// Per-channel CSR offsets, relative to the CSR base.
struct OutboundCsr {
    available_slots: u32,
    transfer: u32,
    route: u32,
}

struct InboundCsr {
    transfer: u32,
    route: u32,
    descriptors_done: u32,
}

const H2T_CSR: OutboundCsr = OutboundCsr {
    available_slots: csr::h2t::AVAILABLE_SLOTS,
    transfer: csr::h2t::TRANSFER,
    route: csr::h2t::ROUTE,
};

const MGMT_CSR: OutboundCsr = OutboundCsr {
    available_slots: csr::mgmt::AVAILABLE_SLOTS,
    transfer: csr::mgmt::TRANSFER,
    route: csr::mgmt::ROUTE,
};

const T2H_CSR: InboundCsr = InboundCsr {
    transfer: csr::t2h::TRANSFER,
    route: csr::t2h::ROUTE,
    descriptors_done: csr::t2h::DESCRIPTORS_DONE,
};

const MGMT_RSP_CSR: InboundCsr = InboundCsr {
    transfer: csr::mgmt_rsp::TRANSFER,
    route: csr::mgmt_rsp::ROUTE,
    descriptors_done: csr::mgmt_rsp::DESCRIPTORS_DONE,
};

struct Outbound {
    ring: RingAllocator,
    slots: SlotTracker,
    csr: &'static OutboundCsr,
    is_mgmt: bool,
}

struct Inbound {
    frame: FrameState,
    mem_base: u32,
    csr: &'static InboundCsr,
}

struct Channels {
    h2t: Outbound,
    mgmt: Outbound,
    t2h: Inbound,
    mgmt_rsp: Inbound,
}

/// One streaming debug IP instance behind one opened MMIO interface.
///
/// The engine owns the interface; all bookkeeping lives here rather than in
/// globals, so several instances can coexist in one process. None of the
/// transfer operations block, and none of them lock: the caller serializes
/// access per channel.
pub struct StreamDbgIp<M: Mmio> {
    mmio: M,
    info: Option<DesignInfo>,
    channels: Option<Channels>,
}

impl<M: Mmio> StreamDbgIp<M> {
    /// Wraps an opened hardware interface. The engine is unusable until
    /// [`set_design_info`](Self::set_design_info) and [`init`](Self::init)
    /// have both run.
    pub fn new(mmio: M) -> StreamDbgIp<M> {
        StreamDbgIp {
            mmio,
            info: None,
            channels: None,
        }
    }

    /// Supplies the channel window layout. Must be called once before
    /// [`init`](Self::init).
    pub fn set_design_info(&mut self, info: DesignInfo) {
        self.info = Some(info);
    }

    /// Brings the IP up: identity gate, channel reset, slot-counter priming
    /// and window-allocator setup. All-or-nothing — on any error no channel
    /// state is retained and the engine stays unusable.
    pub fn init(&mut self) -> Result<(), InitError> {
        let info = self.info.ok_or(InitError::MissingDesignInfo)?;

        let identity = self.mmio.read_64(info.csr_base + csr::config::TYPE);
        let device_type = identity as u32;
        let version = (identity >> 32) as u32;
        if device_type != csr::SUPPORTED_TYPE || version != csr::SUPPORTED_VERSION {
            return Err(InitError::IncompatibleDevice {
                device_type,
                version,
            });
        }
        log::info!(
            "streaming debug IP type 0x{:08X}, version 0x{:X}",
            device_type,
            version
        );

        self.assert_channel_reset();

        let mut h2t_slots = SlotTracker::new();
        h2t_slots.prime(
            self.mmio
                .read_64(info.csr_base + csr::h2t::AVAILABLE_SLOTS),
        );
        let mut mgmt_slots = SlotTracker::new();
        mgmt_slots.prime(
            self.mmio
                .read_64(info.csr_base + csr::mgmt::AVAILABLE_SLOTS),
        );
        log::debug!(
            "descriptor slots at bring-up: h2t={}, mgmt={}",
            h2t_slots.free_slots(),
            mgmt_slots.free_slots()
        );

        self.channels = Some(Channels {
            h2t: Outbound {
                ring: RingAllocator::new(info.h2t_base, info.h2t_span),
                slots: h2t_slots,
                csr: &H2T_CSR,
                is_mgmt: false,
            },
            mgmt: Outbound {
                ring: RingAllocator::new(info.mgmt_base, info.mgmt_span),
                slots: mgmt_slots,
                csr: &MGMT_CSR,
                is_mgmt: true,
            },
            t2h: Inbound {
                frame: FrameState::new(),
                mem_base: info.t2h_base,
                csr: &T2H_CSR,
            },
            mgmt_rsp: Inbound {
                frame: FrameState::new(),
                mem_base: info.mgmt_rsp_base,
                csr: &MGMT_RSP_CSR,
            },
        });
        Ok(())
    }

    fn csr_base(&self) -> u32 {
        self.info.map(|info| info.csr_base).unwrap_or(0)
    }

    /// Pulses the H2T/T2H reset bit. Also run for the management pair; the
    /// hardware resets both channel pairs together.
    pub fn assert_channel_reset(&mut self) {
        self.mmio.write_64(
            self.csr_base() + csr::config::RESET_AND_LOOPBACK,
            csr::config::H2T_T2H_RESET,
        );
    }

    fn outbound(channels: &mut Channels, channel: OutboundChannel) -> &mut Outbound {
        match channel {
            OutboundChannel::HostToTarget => &mut channels.h2t,
            OutboundChannel::Mgmt => &mut channels.mgmt,
        }
    }

    fn inbound(channels: &mut Channels, channel: InboundChannel) -> &mut Inbound {
        match channel {
            InboundChannel::TargetToHost => &mut channels.t2h,
            InboundChannel::MgmtRsp => &mut channels.mgmt_rsp,
        }
    }

    /// Grants a window range for an outbound payload of `len` bytes, or
    /// `None` when the channel is saturated and the caller should retry
    /// later. Completed descriptors are reclaimed first in either case, so
    /// availability is always current after the call.
    pub fn get_outbound_buffer(&mut self, channel: OutboundChannel, len: usize) -> Option<u32> {
        let base = self.csr_base();
        let Some(channels) = self.channels.as_mut() else {
            log::error!("get_outbound_buffer called before bring-up");
            return None;
        };
        let out = Self::outbound(channels, channel);

        let counter = self.mmio.read_64(base + out.csr.available_slots);
        let reclaimed = out.slots.reclaim(counter);
        if reclaimed > 0 {
            out.ring.free(reclaimed);
        }

        if out.slots.free_slots() == 0 {
            return None;
        }
        let offset = out.ring.alloc(len)?;
        let reserved = out.slots.reserve(aligned_len(len) as u32);
        debug_assert!(reserved, "slot availability was checked above");
        log::trace!(
            "outbound grant on {:?}: offset=0x{:X}, len={}",
            channel,
            offset,
            aligned_len(len)
        );
        Some(offset)
    }

    /// Pushes a filled buffer to the hardware. `payload` must be the offset
    /// returned by the matching [`get_outbound_buffer`](Self::get_outbound_buffer)
    /// call, with the payload already staged behind it.
    pub fn outbound_submitted(
        &mut self,
        channel: OutboundChannel,
        header: &PacketHeader,
        payload: u32,
    ) {
        let base = self.csr_base();
        let Some(channels) = self.channels.as_mut() else {
            log::error!("outbound_submitted called before bring-up");
            return;
        };
        let out = Self::outbound(channels, channel);

        let transfer = TransferWord {
            len: header.len,
            eop: header.eop,
            offset: payload,
        };
        self.mmio.write_64(base + out.csr.transfer, transfer.pack());
        let route = if out.is_mgmt {
            pack_mgmt_route(header.channel)
        } else {
            pack_data_route(header.conn_id, header.channel)
        };
        // Writing the route word is what pushes the descriptor.
        self.mmio.write_64(base + out.csr.route, route);
        log::trace!(
            "submitted on {:?}: len={}, eop={}, payload=0x{:X}",
            channel,
            header.len,
            header.eop,
            payload
        );
    }

    /// Decodes the oldest unconsumed completion of an inbound channel into a
    /// header and the absolute payload offset, or `None` when the channel is
    /// empty. Every `Some` must be matched by exactly one
    /// [`inbound_complete`](Self::inbound_complete) call; the hardware does
    /// not advance until then.
    pub fn acquire_inbound(&mut self, channel: InboundChannel) -> Option<(PacketHeader, u32)> {
        let base = self.csr_base();
        let Some(channels) = self.channels.as_mut() else {
            log::error!("acquire_inbound called before bring-up");
            return None;
        };
        let inb = Self::inbound(channels, channel);

        let word = TransferWord::unpack(self.mmio.read_64(base + inb.csr.transfer));
        if word.is_empty() {
            return None;
        }
        let payload = inb.mem_base + word.offset;
        let sop = inb.frame.step(word.eop);
        let (conn_id, channel_id) = unpack_route(self.mmio.read_64(base + inb.csr.route));

        log::trace!(
            "acquired on {:?}: len={}, sop={}, eop={}, payload=0x{:X}",
            channel,
            word.len,
            sop,
            word.eop,
            payload
        );
        Some((
            PacketHeader {
                sop,
                eop: word.eop,
                len: word.len,
                conn_id,
                channel: channel_id,
            },
            payload,
        ))
    }

    /// Retires the completion most recently acquired from the channel.
    pub fn inbound_complete(&mut self, channel: InboundChannel) {
        let base = self.csr_base();
        let Some(channels) = self.channels.as_mut() else {
            log::error!("inbound_complete called before bring-up");
            return;
        };
        let inb = Self::inbound(channels, channel);
        self.mmio.write_32(base + inb.csr.descriptors_done, 1);
    }

    fn modify_config(&mut self, bit: u64, enable: bool) {
        let reg = self.csr_base() + csr::config::RESET_AND_LOOPBACK;
        let current = self.mmio.read_64(reg);
        let next = if enable { current | bit } else { current & !bit };
        self.mmio.write_64(reg, next);
    }

    /// Routes outbound data straight back into the inbound path inside the
    /// IP. Used by self-tests.
    pub fn set_loopback_mode(&mut self, enable: bool) {
        self.modify_config(csr::config::LOOPBACK, enable);
    }

    pub fn loopback_mode(&mut self) -> bool {
        let reg = self.csr_base() + csr::config::RESET_AND_LOOPBACK;
        self.mmio.read_64(reg) & csr::config::LOOPBACK != 0
    }

    /// Global interrupt enable for the interface.
    pub fn set_interrupts_enabled(&mut self, enable: bool) {
        self.modify_config(csr::config::ENABLE_INT, enable);
    }

    /// Per-channel interrupt mask bits (`csr::config::MASK_*`).
    pub fn set_interrupt_mask(&mut self, bits: u64, enable: bool) {
        let reg = self.csr_base() + csr::config::INTERRUPTS;
        let current = self.mmio.read_64(reg);
        let next = if enable {
            current | bits
        } else {
            current & !bits
        };
        self.mmio.write_64(reg, next);
    }

    /// Whether the design wired up the management channel pair at all.
    pub fn has_mgmt_support(&mut self) -> bool {
        let reg = self.csr_base() + csr::config::MGMT_MGMT_RSP_DESC_DEPTH;
        self.mmio.read_64(reg) > 0
    }

    /// Copies host bytes into the interface at `offset`, in whole 8-byte
    /// words. A trailing partial word is zero-padded on the device side;
    /// callers must not expect byte-level isolation within the last word.
    pub fn copy_to_device(&self, offset: u32, data: &[u8]) {
        for (i, chunk) in data.chunks(8).enumerate() {
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            self.mmio
                .write_64(offset + (i as u32) * 8, u64::from_le_bytes(word));
        }
    }

    /// Copies interface bytes at `offset` into host memory, in whole 8-byte
    /// words; the trailing word is read in full and truncated on the host
    /// side.
    pub fn copy_from_device(&self, offset: u32, data: &mut [u8]) {
        for (i, chunk) in data.chunks_mut(8).enumerate() {
            let word = self.mmio.read_64(offset + (i as u32) * 8).to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    /// Releases the interface.
    pub fn into_inner(self) -> M {
        self.mmio
    }
}

impl<M: Mmio> DebugLink for StreamDbgIp<M> {
    fn init(&mut self) -> Result<(), InitError> {
        StreamDbgIp::init(self)
    }

    fn has_mgmt_support(&mut self) -> bool {
        StreamDbgIp::has_mgmt_support(self)
    }

    fn get_param(&mut self, name: &str) -> Option<String> {
        match name {
            HW_LOOPBACK_PARAM => Some(if self.loopback_mode() { "1" } else { "0" }.to_string()),
            MGMT_SUPPORT_PARAM => {
                Some(if StreamDbgIp::has_mgmt_support(self) { "1" } else { "0" }.to_string())
            }
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: &str) -> bool {
        match name {
            HW_LOOPBACK_PARAM => {
                self.set_loopback_mode(value == "1");
                true
            }
            _ => false,
        }
    }

    fn get_outbound_buffer(&mut self, channel: OutboundChannel, len: usize) -> Option<u32> {
        StreamDbgIp::get_outbound_buffer(self, channel, len)
    }

    fn outbound_submitted(
        &mut self,
        channel: OutboundChannel,
        header: &PacketHeader,
        payload: u32,
    ) {
        StreamDbgIp::outbound_submitted(self, channel, header, payload)
    }

    fn acquire_inbound(&mut self, channel: InboundChannel) -> Option<(PacketHeader, u32)> {
        StreamDbgIp::acquire_inbound(self, channel)
    }

    fn inbound_complete(&mut self, channel: InboundChannel) {
        StreamDbgIp::inbound_complete(self, channel)
    }
}
