//! # Streaming Debug Bridge
//!
//! Command-line front end for the FPGA streaming debug IP driver on Linux.
//!
//! ## Overview
//!
//! This crate wires the platform-independent
//! [`streamdbg_driver`](https://docs.rs/streamdbg-driver/) engine to a
//! concrete memory-mapped interface exposed through the Linux UIO
//! subsystem, and offers a few subcommands to bring the IP up and exercise
//! it end to end: identity probing, a hardware loopback round trip, and an
//! interrupt watcher.
pub mod platform;

use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use clap_num::maybe_hex;
use env_logger::Env;
use streamdbg_driver::{
    engine::{DesignInfo, StreamDbgIp},
    irq::InterruptService,
};
use streamdbg_protocol::{InboundChannel, OutboundChannel, PacketHeader, csr};

use crate::platform::uio::{UioEventSource, UioPlatform};

/// UIO name the FPGA design publishes for the debug IP's register space.
const UIO_DEVICE_NAME: &str = "stream_dbg";

#[derive(Parser, Eq, PartialEq, Clone)]
enum Command {
    /// Bring the debug IP up and report its identity and capabilities.
    Probe,
    /// Route outbound data back inside the IP and verify a full round trip.
    Loopback {
        #[arg(short, long, help = "Payload length in bytes", default_value = "64")]
        len: usize,
    },
    /// Enable interrupt delivery and count events for a while.
    WatchInterrupts {
        #[arg(short, long, help = "How long to watch, in seconds", default_value = "20")]
        seconds: u64,
    },
}

#[derive(Parser)]
#[command(about = "Streaming debug IP bridge over memory-mapped UIO", long_about = None)]
struct Args {
    #[arg(short, long, help = "UIO device path; auto-detected when omitted")]
    uio_path: Option<PathBuf>,

    #[arg(
        short = 's',
        long,
        value_parser = maybe_hex::<usize>,
        default_value = "0x10000",
        help = "Address span of the mapped interface in bytes"
    )]
    address_span: usize,

    #[arg(
        short = 'a',
        long,
        value_parser = maybe_hex::<usize>,
        default_value = "0",
        help = "Start address of the debug IP within the mapped interface"
    )]
    start_address: usize,

    #[arg(
        short = 'm',
        long,
        value_parser = maybe_hex::<usize>,
        default_value = "4096",
        help = "H2T/T2H memory window size in bytes"
    )]
    h2t_t2h_mem_size: usize,

    #[clap(subcommand)]
    command: Command,
}

/// Attempts to automatically find the debug IP's UIO device by name.
fn uio_device_path() -> Option<PathBuf> {
    let uio_class_path = Path::new("/sys/class/uio");
    for entry in uio_class_path.read_dir().ok()? {
        let mut path = entry.ok()?.path();
        log::debug!("Looking at UIO path {}", path.display());
        path.push("name");
        let name = match fs::read_to_string(&path) {
            Ok(name) => name,
            Err(_) => continue,
        };
        let uio_name = name.trim();
        log::debug!("UIO has name {}", uio_name);
        if uio_name == UIO_DEVICE_NAME {
            // This will be something like 'uio2'
            let uio_indexed_name = path.parent()?.file_name()?;
            let mut dev_path = PathBuf::from("/dev");
            // This will be something like '/dev/uio2'
            dev_path.push(uio_indexed_name);
            return Some(dev_path);
        }
    }
    None
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    log::info!("Starting streaming debug bridge");

    let args = Args::parse();
    let uio_path = match args.uio_path.clone().or_else(uio_device_path) {
        Some(path) => path,
        None => {
            println!(
                "No streaming debug UIO device could be detected. Explicitly specify a path using --uio-path <path>."
            );
            return Ok(());
        }
    };

    log::info!("Bridge configuration:");
    log::info!("   UIO device: {}", uio_path.display());
    log::info!("   Address span: 0x{:X}", args.address_span);
    log::info!("   Start address: 0x{:X}", args.start_address);
    log::info!("   H2T/T2H memory size: {}", args.h2t_t2h_mem_size);

    let mmio = UioPlatform::open(&uio_path, args.address_span, args.start_address)?;
    let mut ip = StreamDbgIp::new(mmio);
    ip.set_design_info(DesignInfo::with_data_windows(args.h2t_t2h_mem_size));
    ip.init()?;

    match args.command {
        Command::Probe => probe(&mut ip),
        Command::Loopback { len } => loopback(&mut ip, len)?,
        Command::WatchInterrupts { seconds } => watch_interrupts(&mut ip, &uio_path, seconds)?,
    }
    Ok(())
}

fn probe(ip: &mut StreamDbgIp<UioPlatform>) {
    println!(
        "Compatible streaming debug IP (type 0x{:08X}, version 0x{:X})",
        csr::SUPPORTED_TYPE,
        csr::SUPPORTED_VERSION
    );
    println!(
        "Management channels: {}",
        if ip.has_mgmt_support() {
            "available"
        } else {
            "not wired"
        }
    );
    println!(
        "Hardware loopback: {}",
        if ip.loopback_mode() {
            "enabled"
        } else {
            "disabled"
        }
    );
}

fn loopback(ip: &mut StreamDbgIp<UioPlatform>, len: usize) -> Result<(), Box<dyn Error>> {
    ip.set_loopback_mode(true);
    let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();

    let offset = ip
        .get_outbound_buffer(OutboundChannel::HostToTarget, len)
        .ok_or_else(|| io::Error::other("no outbound buffer available"))?;
    ip.copy_to_device(offset, &payload);
    let header = PacketHeader {
        sop: true,
        eop: true,
        len: len as u32,
        conn_id: 0,
        channel: 0,
    };
    ip.outbound_submitted(OutboundChannel::HostToTarget, &header, offset);
    log::debug!("Loopback payload submitted: len={}, offset=0x{:X}", len, offset);

    let deadline = Instant::now() + Duration::from_secs(1);
    let (rx_header, rx_payload) = loop {
        if let Some(completion) = ip.acquire_inbound(InboundChannel::TargetToHost) {
            break completion;
        }
        if Instant::now() >= deadline {
            ip.set_loopback_mode(false);
            return Err(io::Error::other("timed out waiting for the loopback data").into());
        }
    };

    let mut readback = vec![0u8; rx_header.len as usize];
    ip.copy_from_device(rx_payload, &mut readback);
    ip.inbound_complete(InboundChannel::TargetToHost);
    ip.set_loopback_mode(false);

    if readback != payload {
        log::error!("Loopback mismatch: sent {:02x?}, got {:02x?}", payload, readback);
        return Err(io::Error::other("loopback data mismatch").into());
    }
    println!("Loopback OK: {} bytes round-tripped.", len);
    Ok(())
}

fn watch_interrupts(
    ip: &mut StreamDbgIp<UioPlatform>,
    uio_path: &Path,
    seconds: u64,
) -> Result<(), Box<dyn Error>> {
    let events = UioEventSource::open(uio_path)?;
    let service = InterruptService::spawn(events)?;

    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    service.register_callback(Box::new(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    ip.set_interrupt_mask(csr::config::MASK_T2H | csr::config::MASK_MGMT_RSP, true);
    ip.set_interrupts_enabled(true);
    service.enable();
    println!("Interrupts enabled; watching for {} second(s)...", seconds);
    thread::sleep(Duration::from_secs(seconds));

    service.disable();
    ip.set_interrupts_enabled(false);
    ip.set_interrupt_mask(csr::config::MASK_T2H | csr::config::MASK_MGMT_RSP, false);
    service.shutdown();

    println!("{} interrupt(s) delivered.", count.load(Ordering::SeqCst));
    Ok(())
}
