//! # MMIO accessor boundary
//!
//! The engine never holds a raw pointer; every hardware access goes through
//! an implementation of [`Mmio`] as an (implementation, byte offset) pair.
//! Implementations are expected to be bounds-checked and to perform volatile
//! accesses where real device memory is behind them; the unsafe volatile
//! plumbing stays inside the platform crate that owns the mapping.
//!
//! One implementation stands for one opened hardware interface. Opening is
//! an ownership question in Rust: constructing the platform type is the
//! open, dropping it is the close, and the engine taking the value by move
//! enforces the open-exactly-once model.

/// Typed access to one opened, byte-addressable hardware interface.
///
/// Offsets are byte offsets from the start of the interface. Multi-byte
/// quantities are little-endian in register space.
pub trait Mmio {
    fn read_8(&self, offset: u32) -> u8;
    fn write_8(&self, offset: u32, value: u8);

    fn read_16(&self, offset: u32) -> u16;
    fn write_16(&self, offset: u32, value: u16);

    fn read_32(&self, offset: u32) -> u32;
    fn write_32(&self, offset: u32, value: u32);

    fn read_64(&self, offset: u32) -> u64;
    fn write_64(&self, offset: u32, value: u64);

    /// Reads a 512-bit line as eight consecutive 64-bit words.
    fn read_512(&self, offset: u32, value: &mut [u8; 64]) {
        for (i, chunk) in value.chunks_exact_mut(8).enumerate() {
            let word = self.read_64(offset + (i as u32) * 8);
            chunk.copy_from_slice(&word.to_le_bytes());
        }
    }

    /// Writes a 512-bit line as eight consecutive 64-bit words.
    fn write_512(&self, offset: u32, value: &[u8; 64]) {
        for (i, chunk) in value.chunks_exact(8).enumerate() {
            let word = u64::from_le_bytes(chunk.try_into().expect("chunk is 8 bytes"));
            self.write_64(offset + (i as u32) * 8, word);
        }
    }
}
