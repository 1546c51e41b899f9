//! SMBus command-channel contract the touchpad is reached through.
//!
//! The bus itself (controller, addressing, host-notify interrupt plumbing)
//! lives outside of this crate. The driver only ever issues the three
//! transfers below, always addressed by an 8-bit command code.

pub mod testbus;

use arrayvec::ArrayVec;
use thiserror::Error;

/// Maximum payload of a single SMBus block transfer
pub const I2C_SMBUS_BLOCK_MAX: usize = 32;

/// Data returned by a block read
pub type SmbusBlock = ArrayVec<u8, I2C_SMBUS_BLOCK_MAX>;

/// Failure reported by the underlying bus
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Bus controller returned a (negative) status code
    #[error("bus transfer failed with status {0}")]
    Status(i32),

    /// Device did not acknowledge the transfer
    #[error("device did not acknowledge")]
    Nak,

    /// Transfer did not complete in time
    #[error("bus transfer timed out")]
    Timeout,
}

impl TransportError {
    /// Status code in the form a host framework expects (negative errno-like)
    pub fn status(&self) -> i32 {
        match self {
            Self::Status(s) => *s,
            // -ENXIO
            Self::Nak => -6,
            // -ETIMEDOUT
            Self::Timeout => -110,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

pub trait SmbusTransport {
    /// SMBus "block read" of `command`. The length of the returned block is
    /// whatever the device reported.
    fn read_block(&mut self, command: u8) -> TransportResult<SmbusBlock>;

    /// SMBus "send byte"
    fn write_byte(&mut self, command: u8) -> TransportResult<()>;

    /// SMBus "block write" of `payload` to `command`
    fn write_block(&mut self, command: u8, payload: &[u8]) -> TransportResult<()>;
}

impl<T: SmbusTransport + ?Sized> SmbusTransport for Box<T> {
    fn read_block(&mut self, command: u8) -> TransportResult<SmbusBlock> {
        (**self).read_block(command)
    }

    fn write_byte(&mut self, command: u8) -> TransportResult<()> {
        (**self).write_byte(command)
    }

    fn write_block(&mut self, command: u8, payload: &[u8]) -> TransportResult<()> {
        (**self).write_block(command, payload)
    }
}

impl core::fmt::Debug for dyn SmbusTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SmbusTransport")
    }
}

pub type SmbusTransportInstance = Box<dyn SmbusTransport + Send>;
