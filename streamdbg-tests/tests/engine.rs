//! Engine behaviour against the software-model device: bring-up gating,
//! buffer accounting, descriptor encoding and inbound framing.

use streamdbg_driver::DebugLink;
use streamdbg_driver::engine::{
    DesignInfo, HW_LOOPBACK_PARAM, MGMT_SUPPORT_PARAM, StreamDbgIp,
};
use streamdbg_driver::error::InitError;
use streamdbg_driver::mmio::Mmio;
use streamdbg_driver::swmodel::SwModel;
use streamdbg_protocol::{
    InboundChannel, OutboundChannel, PacketHeader, TransferWord, csr, pack_data_route,
    pack_mgmt_route,
};
use streamdbg_tests::{DATA_WINDOW, SPAN, bring_up, model_device};

const H2T_BASE: u32 = DATA_WINDOW as u32;
const T2H_BASE: u32 = 2 * DATA_WINDOW as u32;

#[test]
fn bring_up_requires_design_info() {
    let mut ip = StreamDbgIp::new(model_device());
    assert_eq!(ip.init(), Err(InitError::MissingDesignInfo));
}

#[test]
fn incompatible_device_is_refused_with_no_state() {
    let model = SwModel::new(SPAN);
    model.write_64(csr::config::TYPE, 0x1111_1111);
    let mut ip = StreamDbgIp::new(model.clone());
    ip.set_design_info(DesignInfo::with_data_windows(DATA_WINDOW));
    assert_eq!(
        ip.init(),
        Err(InitError::IncompatibleDevice {
            device_type: 0x1111_1111,
            version: 0
        })
    );
    // Bring-up is all-or-nothing: no reset was issued and no channel state
    // exists, so transfer calls report saturation instead of touching CSRs.
    assert_eq!(model.read_64(csr::config::RESET_AND_LOOPBACK), u64::MAX);
    assert_eq!(
        ip.get_outbound_buffer(OutboundChannel::HostToTarget, 8),
        None
    );
}

#[test]
fn window_grant_scenario() {
    let model = model_device();
    let mut ip = bring_up(&model);

    // 100 bytes round up to 104 and land at the start of the window.
    let offset = ip
        .get_outbound_buffer(OutboundChannel::HostToTarget, 100)
        .expect("fresh channel has space");
    assert_eq!(offset, H2T_BASE);

    // The whole window no longer fits.
    assert_eq!(
        ip.get_outbound_buffer(OutboundChannel::HostToTarget, DATA_WINDOW),
        None
    );

    // Hardware completes the descriptor: one more cumulative slot.
    model.write_64(csr::h2t::AVAILABLE_SLOTS, 129);
    let offset = ip
        .get_outbound_buffer(OutboundChannel::HostToTarget, DATA_WINDOW)
        .expect("the reclaimed window holds a full-span payload");
    assert_eq!(offset, H2T_BASE);
}

#[test]
fn grants_need_both_a_slot_and_window_space() {
    let model = model_device();
    // Only two descriptor slots at bring-up.
    model.write_64(csr::h2t::AVAILABLE_SLOTS, 2);
    let mut ip = bring_up(&model);

    assert!(
        ip.get_outbound_buffer(OutboundChannel::HostToTarget, 8)
            .is_some()
    );
    assert!(
        ip.get_outbound_buffer(OutboundChannel::HostToTarget, 8)
            .is_some()
    );
    // Plenty of window bytes left, but no slot.
    assert_eq!(ip.get_outbound_buffer(OutboundChannel::HostToTarget, 8), None);

    // One completion frees exactly one slot.
    model.write_64(csr::h2t::AVAILABLE_SLOTS, 3);
    assert!(
        ip.get_outbound_buffer(OutboundChannel::HostToTarget, 8)
            .is_some()
    );
}

#[test]
fn submit_writes_the_packed_descriptor_words() {
    let model = model_device();
    let mut ip = bring_up(&model);

    let payload = ip
        .get_outbound_buffer(OutboundChannel::HostToTarget, 100)
        .unwrap();
    let header = PacketHeader {
        sop: true,
        eop: true,
        len: 100,
        conn_id: 5,
        channel: 9,
    };
    ip.outbound_submitted(OutboundChannel::HostToTarget, &header, payload);

    let expected = TransferWord {
        len: 100,
        eop: true,
        offset: payload,
    };
    assert_eq!(model.read_64(csr::h2t::TRANSFER), expected.pack());
    assert_eq!(model.read_64(csr::h2t::ROUTE), pack_data_route(5, 9));
}

fn mgmt_design() -> DesignInfo {
    DesignInfo {
        csr_base: 0,
        h2t_base: 0x1000,
        h2t_span: 0x800,
        t2h_base: 0x1800,
        t2h_span: 0x800,
        mgmt_base: 0x3000,
        mgmt_span: 0x800,
        mgmt_rsp_base: 0x3800,
        mgmt_rsp_span: 0x800,
    }
}

#[test]
fn mgmt_submit_routes_the_channel_only() {
    let model = model_device();
    let mut ip = StreamDbgIp::new(model.clone());
    ip.set_design_info(mgmt_design());
    ip.init().unwrap();

    let payload = ip
        .get_outbound_buffer(OutboundChannel::Mgmt, 16)
        .expect("management window is wired in this design");
    assert_eq!(payload, 0x3000);
    let header = PacketHeader {
        sop: true,
        eop: true,
        len: 16,
        conn_id: 0,
        channel: 0x21,
    };
    ip.outbound_submitted(OutboundChannel::Mgmt, &header, payload);
    assert_eq!(model.read_64(csr::mgmt::ROUTE), pack_mgmt_route(0x21));
}

#[test]
fn unwired_mgmt_window_never_grants() {
    let model = model_device();
    let mut ip = bring_up(&model);
    // The default layout leaves the management windows empty.
    assert_eq!(ip.get_outbound_buffer(OutboundChannel::Mgmt, 8), None);
}

#[test]
fn inbound_framing_alternates_sop() {
    let model = model_device();
    let mut ip = bring_up(&model);
    model.write_64(csr::t2h::ROUTE, pack_data_route(3, 7));

    let records = [
        // (eop, window offset) — a two-record packet then a one-record one.
        (false, 0u32),
        (true, 16),
        (true, 32),
    ];
    let mut seen = Vec::new();
    for (eop, offset) in records {
        let word = TransferWord {
            len: 16,
            eop,
            offset,
        };
        model.write_64(csr::t2h::TRANSFER, word.pack());
        let (header, payload) = ip
            .acquire_inbound(InboundChannel::TargetToHost)
            .expect("a descriptor is pending");
        assert_eq!(payload, T2H_BASE + offset);
        assert_eq!(header.conn_id, 3);
        assert_eq!(header.channel, 7);
        ip.inbound_complete(InboundChannel::TargetToHost);
        seen.push((header.sop, header.eop));
    }
    assert_eq!(seen, vec![(true, false), (false, true), (true, true)]);
}

#[test]
fn zero_length_inbound_means_empty() {
    let model = model_device();
    let mut ip = bring_up(&model);
    // Length zero, garbage in the offset field: still no data.
    model.write_64(csr::t2h::TRANSFER, 0xDEAD_BEEF_0000_0000);
    assert_eq!(ip.acquire_inbound(InboundChannel::TargetToHost), None);
}

#[test]
fn inbound_complete_advances_the_hardware() {
    let model = model_device();
    let mut ip = bring_up(&model);
    let word = TransferWord {
        len: 8,
        eop: true,
        offset: 0,
    };
    model.write_64(csr::t2h::TRANSFER, word.pack());
    model.write_64(csr::t2h::ROUTE, 0);
    ip.acquire_inbound(InboundChannel::TargetToHost).unwrap();
    ip.inbound_complete(InboundChannel::TargetToHost);
    assert_eq!(model.read_32(csr::t2h::DESCRIPTORS_DONE), 1);
}

#[test]
fn mgmt_rsp_decodes_the_channel_id() {
    let model = model_device();
    let mut ip = StreamDbgIp::new(model.clone());
    ip.set_design_info(mgmt_design());
    ip.init().unwrap();

    let word = TransferWord {
        len: 24,
        eop: true,
        offset: 8,
    };
    model.write_64(csr::mgmt_rsp::TRANSFER, word.pack());
    model.write_64(csr::mgmt_rsp::ROUTE, pack_mgmt_route(0x42));
    let (header, payload) = ip.acquire_inbound(InboundChannel::MgmtRsp).unwrap();
    assert_eq!(payload, 0x3800 + 8);
    assert_eq!(header.channel, 0x42);
    assert!(header.sop);
    assert!(header.eop);
    ip.inbound_complete(InboundChannel::MgmtRsp);
    assert_eq!(model.read_32(csr::mgmt_rsp::DESCRIPTORS_DONE), 1);
}

#[test]
fn payload_roundtrip_through_the_model() {
    let model = model_device();
    let mut ip = bring_up(&model);

    let payload: Vec<u8> = (0..100u8).collect();
    let offset = ip
        .get_outbound_buffer(OutboundChannel::HostToTarget, payload.len())
        .unwrap();
    ip.copy_to_device(offset, &payload);
    let header = PacketHeader {
        sop: true,
        eop: true,
        len: payload.len() as u32,
        conn_id: 1,
        channel: 0,
    };
    ip.outbound_submitted(OutboundChannel::HostToTarget, &header, offset);

    // Play the hardware: move the staged bytes into the T2H window and
    // post a matching completion.
    let staged = TransferWord::unpack(model.read_64(csr::h2t::TRANSFER));
    assert_eq!(staged.offset, offset);
    let mut moved = vec![0u8; streamdbg_protocol::aligned_len(payload.len())];
    for (i, byte) in moved.iter_mut().enumerate() {
        *byte = model.read_8(offset + i as u32);
    }
    for (i, byte) in moved.iter().enumerate() {
        model.write_8(T2H_BASE + i as u32, *byte);
    }
    let completion = TransferWord {
        len: payload.len() as u32,
        eop: true,
        offset: 0,
    };
    model.write_64(csr::t2h::TRANSFER, completion.pack());
    model.write_64(csr::t2h::ROUTE, pack_data_route(1, 0));

    let (rx_header, rx_payload) = ip.acquire_inbound(InboundChannel::TargetToHost).unwrap();
    assert_eq!(rx_header.len, payload.len() as u32);
    let mut readback = vec![0u8; rx_header.len as usize];
    ip.copy_from_device(rx_payload, &mut readback);
    ip.inbound_complete(InboundChannel::TargetToHost);
    assert_eq!(readback, payload);
}

#[test]
fn loopback_and_mgmt_params() {
    let model = model_device();
    let mut ip = bring_up(&model);

    assert!(ip.set_param(HW_LOOPBACK_PARAM, "1"));
    assert_ne!(
        model.read_64(csr::config::RESET_AND_LOOPBACK) & csr::config::LOOPBACK,
        0
    );
    assert_eq!(ip.get_param(HW_LOOPBACK_PARAM).as_deref(), Some("1"));
    assert!(ip.set_param(HW_LOOPBACK_PARAM, "0"));
    assert_eq!(ip.get_param(HW_LOOPBACK_PARAM).as_deref(), Some("0"));

    assert_eq!(ip.get_param(MGMT_SUPPORT_PARAM).as_deref(), Some("1"));
    assert!(ip.has_mgmt_support());

    assert!(!ip.set_param("#NO_SUCH_PARAM", "1"));
    assert_eq!(ip.get_param("#NO_SUCH_PARAM"), None);
}
