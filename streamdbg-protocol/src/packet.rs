//! Packet framing vocabulary shared by the driver and the layers above it.

/// The two channels the host pushes descriptors into.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutboundChannel {
    /// Bulk host-to-target data (H2T).
    HostToTarget,
    /// Management requests (MGMT).
    Mgmt,
}

/// The two channels the host drains completions from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InboundChannel {
    /// Bulk target-to-host data (T2H).
    TargetToHost,
    /// Management responses (MGMT-RSP).
    MgmtRsp,
}

/// Header of one transfer as seen by the layers above the driver.
///
/// Outbound, the caller fills it in before submitting; inbound, the driver
/// reconstructs it from the CSRs. `conn_id` is only meaningful on the data
/// channels and is zero for management traffic.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PacketHeader {
    pub sop: bool,
    pub eop: bool,
    /// Payload length in bytes, before word alignment.
    pub len: u32,
    pub conn_id: u8,
    pub channel: u32,
}

/// Start-of-packet tracking for one inbound channel.
///
/// The hardware only reports end-of-packet; the start flag is implied by the
/// previous record. A fresh stream starts a packet, and every record that
/// follows an end-of-packet starts the next one.
#[derive(Debug)]
pub struct FrameState {
    sop_pending: bool,
}

impl FrameState {
    pub fn new() -> FrameState {
        FrameState { sop_pending: true }
    }

    /// Consumes one record with the given end-of-packet flag and returns
    /// whether that record starts a packet.
    pub fn step(&mut self, eop: bool) -> bool {
        let sop = self.sop_pending;
        self.sop_pending = eop;
        sop
    }

    /// Forgets any partially observed packet; the next record starts a new
    /// one. Used at channel reset.
    pub fn reset(&mut self) {
        self.sop_pending = true;
    }
}

impl Default for FrameState {
    fn default() -> FrameState {
        FrameState::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sop_set_exactly_once_per_packet() {
        let mut frame = FrameState::new();
        // Packet of three records, then a single-record packet.
        let eops = [false, false, true, true];
        let sops: Vec<bool> = eops.iter().map(|&eop| frame.step(eop)).collect();
        assert_eq!(sops, vec![true, false, false, true]);
    }

    #[test]
    fn reset_restarts_framing_mid_packet() {
        let mut frame = FrameState::new();
        assert!(frame.step(false));
        assert!(!frame.step(false));
        frame.reset();
        assert!(frame.step(false));
    }
}
