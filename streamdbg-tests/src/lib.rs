//! Shared fixtures for the integration tests: a software-model device with
//! the supported identity and primed descriptor counters, and a helper that
//! brings an engine up on top of it.

use streamdbg_driver::engine::{DesignInfo, StreamDbgIp};
use streamdbg_driver::mmio::Mmio;
use streamdbg_driver::swmodel::SwModel;
use streamdbg_protocol::csr;

/// Span of the modelled interface.
pub const SPAN: usize = 0x4000;
/// Span of each data window, and therefore the H2T window base.
pub const DATA_WINDOW: usize = 4096;

/// A software-model interface that passes the identity gate and reports
/// full descriptor rings on both outbound channels.
pub fn model_device() -> SwModel {
    let model = SwModel::new(SPAN);
    model.write_64(csr::config::TYPE, u64::from(csr::SUPPORTED_TYPE));
    model.write_64(csr::h2t::AVAILABLE_SLOTS, 128);
    model.write_64(csr::mgmt::AVAILABLE_SLOTS, 128);
    model.write_64(csr::config::MGMT_MGMT_RSP_DESC_DEPTH, 128);
    model
}

/// Brings an engine up against a clone of `model`, with the conventional
/// stacked-window layout. The test keeps its own handle to play the
/// hardware side.
pub fn bring_up(model: &SwModel) -> StreamDbgIp<SwModel> {
    let mut ip = StreamDbgIp::new(model.clone());
    ip.set_design_info(DesignInfo::with_data_windows(DATA_WINDOW));
    ip.init().expect("the model device is compatible");
    ip
}
