//! Platform implementations of the driver's hardware seams.
pub mod uio;
