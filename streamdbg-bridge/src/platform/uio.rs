//! # UIO Platform
//!
//! For streaming debug IPs that are exposed via the Linux UIO subsystem:
//! the register space and channel windows are memory-mapped from the UIO
//! device file, and hardware interrupts are delivered as 4-byte event
//! counts read from the same device.
//!
//! ## Example Usage
//!
//! ```ignore
//! use streamdbg_bridge::platform::uio::UioPlatform;
//! use streamdbg_driver::engine::{DesignInfo, StreamDbgIp};
//!
//! let platform = UioPlatform::open("/dev/uio0", 0x10000, 0)?;
//! let mut ip = StreamDbgIp::new(platform);
//! ip.set_design_info(DesignInfo::with_data_windows(4096));
//! ip.init()?;
//! ```
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    num::NonZero,
    os::fd::AsFd,
    path::Path,
    ptr::{NonNull, read_volatile, write_volatile},
    time::Duration,
};

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap};

use streamdbg_driver::{irq::EventSource, mmio::Mmio};

/// One opened, memory-mapped UIO interface.
///
/// Constructing the value is the open, dropping it is the close; moving it
/// into the engine is what enforces the open-exactly-once handle model.
pub struct UioPlatform {
    mapping: NonNull<u8>,
    span: usize,
    /// Offset of the debug IP inside the mapping.
    start: usize,
}

impl UioPlatform {
    pub fn open(
        path: impl AsRef<Path>,
        span: usize,
        start: usize,
    ) -> io::Result<UioPlatform> {
        let device_path = path.as_ref();
        log::debug!("Opening UIO device: {}", device_path.display());
        let file = OpenOptions::new().read(true).write(true).open(device_path)?;
        log::debug!("UIO device file opened successfully");

        if start >= span {
            return Err(io::Error::other("start address lies outside the address span"));
        }
        let length =
            NonZero::new(span).ok_or_else(|| io::Error::other("address span must be non-zero"))?;

        let mapping = unsafe {
            log::debug!("Mapping UIO memory (size=0x{:x})", span);
            let ptr = mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                file,
                0,
            )?;
            log::info!("UIO memory mapped successfully");
            ptr.cast::<u8>()
        };
        Ok(UioPlatform {
            mapping,
            span,
            start,
        })
    }

    fn reg(&self, offset: u32, width: usize) -> *mut u8 {
        let at = self.start + offset as usize;
        assert!(
            at + width <= self.span,
            "MMIO access out of bounds: offset=0x{:X}, width={}",
            offset,
            width
        );
        // SAFETY: `at + width` lies within the mapping checked above.
        unsafe { self.mapping.as_ptr().add(at) }
    }
}

impl Mmio for UioPlatform {
    fn read_8(&self, offset: u32) -> u8 {
        // SAFETY: reg() bounds-checked the access against the mapping.
        unsafe { read_volatile(self.reg(offset, 1)) }
    }

    fn write_8(&self, offset: u32, value: u8) {
        // SAFETY: reg() bounds-checked the access against the mapping.
        unsafe { write_volatile(self.reg(offset, 1), value) }
    }

    fn read_16(&self, offset: u32) -> u16 {
        // SAFETY: reg() bounds-checked the access against the mapping.
        unsafe { read_volatile(self.reg(offset, 2) as *mut u16) }
    }

    fn write_16(&self, offset: u32, value: u16) {
        // SAFETY: reg() bounds-checked the access against the mapping.
        unsafe { write_volatile(self.reg(offset, 2) as *mut u16, value) }
    }

    fn read_32(&self, offset: u32) -> u32 {
        // SAFETY: reg() bounds-checked the access against the mapping.
        unsafe { read_volatile(self.reg(offset, 4) as *mut u32) }
    }

    fn write_32(&self, offset: u32, value: u32) {
        // SAFETY: reg() bounds-checked the access against the mapping.
        unsafe { write_volatile(self.reg(offset, 4) as *mut u32, value) }
    }

    fn read_64(&self, offset: u32) -> u64 {
        // SAFETY: reg() bounds-checked the access against the mapping.
        unsafe { read_volatile(self.reg(offset, 8) as *mut u64) }
    }

    fn write_64(&self, offset: u32, value: u64) {
        // SAFETY: reg() bounds-checked the access against the mapping.
        unsafe { write_volatile(self.reg(offset, 8) as *mut u64, value) }
    }
}

impl Drop for UioPlatform {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.mapping.cast(), self.span);
        }
    }
}

/// Hardware event source backed by the UIO interrupt machinery.
///
/// Opens its own descriptor on the device so the delivery thread and the
/// memory mapping do not share file state.
pub struct UioEventSource {
    file: File,
}

impl UioEventSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<UioEventSource> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(UioEventSource { file })
    }
}

impl EventSource for UioEventSource {
    fn rearm(&mut self) -> io::Result<()> {
        // UIO unmasks the interrupt by writing 1 to the device file.
        self.file.write_all(&1u32.to_ne_bytes())
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let ready = poll(&mut fds, PollTimeout::from(millis)).map_err(io::Error::from)?;
        if ready == 0 {
            return Ok(false);
        }
        // The pending read is the cumulative interrupt count.
        let mut count = [0u8; 4];
        self.file.read_exact(&mut count)?;
        log::trace!("UIO interrupt event #{}", u32::from_ne_bytes(count));
        Ok(true)
    }
}
