//! Address-space interface used by leaves.
//!
//! The scheduler never touches memory itself. Leaves that do (the CPU fetch
//! step, DMA-like peripherals) talk to an [`AddressSpace`] supplied by the
//! embedding emulator. Each access names the permissions it needs; the region
//! holding the address decides whether they are granted.
//!
//! Attribute bits split in two groups. The *critical* group (read, write and
//! execute, for user and supervisor) is enforced: an access fails unless the
//! region grants at least one requested critical bit. The *non-critical* group
//! (cacheable, ordered) only describes timing and never fails an access.

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Access permissions requested by an access or granted by a region.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct AccessAttributes: u32 {
        /// User-mode read.
        const USER_READ = 1 << 0;
        /// User-mode write.
        const USER_WRITE = 1 << 1;
        /// User-mode instruction fetch.
        const USER_EXECUTE = 1 << 2;
        /// User-mode cacheable.
        const USER_CACHEABLE = 1 << 3;
        /// User-mode strongly ordered.
        const USER_ORDERED = 1 << 4;
        /// Supervisor read.
        const SUPERVISOR_READ = 1 << 5;
        /// Supervisor write.
        const SUPERVISOR_WRITE = 1 << 6;
        /// Supervisor instruction fetch.
        const SUPERVISOR_EXECUTE = 1 << 7;
        /// Supervisor cacheable.
        const SUPERVISOR_CACHEABLE = 1 << 8;
        /// Supervisor strongly ordered.
        const SUPERVISOR_ORDERED = 1 << 9;

        /// Bits that gate an access.
        const CRITICAL = Self::USER_READ.bits()
            | Self::USER_WRITE.bits()
            | Self::USER_EXECUTE.bits()
            | Self::SUPERVISOR_READ.bits()
            | Self::SUPERVISOR_WRITE.bits()
            | Self::SUPERVISOR_EXECUTE.bits();
        /// Bits that only describe timing.
        const NONCRITICAL = Self::USER_CACHEABLE.bits()
            | Self::USER_ORDERED.bits()
            | Self::SUPERVISOR_CACHEABLE.bits()
            | Self::SUPERVISOR_ORDERED.bits();
    }
}

impl AccessAttributes {
    /// Full access for both privilege levels.
    pub const ALL: Self = Self::CRITICAL;

    /// True if a region with these attributes admits an access requesting
    /// `requested`.
    pub fn permits(self, requested: AccessAttributes) -> bool {
        self.intersects(requested & Self::CRITICAL)
    }
}

/// Access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessWidth {
    /// 8 bits.
    Byte,
    /// 16 bits.
    Half,
    /// 32 bits.
    Word,
}

impl AccessWidth {
    /// Width in bytes.
    pub fn bytes(self) -> u32 {
        match self {
            AccessWidth::Byte => 1,
            AccessWidth::Half => 2,
            AccessWidth::Word => 4,
        }
    }

    /// Mask covering the width's value range.
    pub fn mask(self) -> u32 {
        match self {
            AccessWidth::Byte => 0xFF,
            AccessWidth::Half => 0xFFFF,
            AccessWidth::Word => 0xFFFF_FFFF,
        }
    }
}

/// A failed access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    /// No region contains the address (or the access runs past its end).
    #[error("no region mapped at {address:#010x}")]
    Unmapped {
        /// Faulting address.
        address: u32,
    },

    /// The region does not grant any of the requested critical permissions.
    #[error("access {requested:?} denied at {address:#010x} (region allows {granted:?})")]
    AttributeViolation {
        /// Faulting address.
        address: u32,
        /// Permissions the access asked for.
        requested: AccessAttributes,
        /// Permissions the region grants.
        granted: AccessAttributes,
    },
}

/// Memory-mapped address space seen by leaves.
///
/// Values are little-endian and zero-extended to `u32`.
pub trait AddressSpace: Send {
    /// Read `width` bytes at `address`.
    fn read(
        &self,
        address: u32,
        width: AccessWidth,
        attributes: AccessAttributes,
    ) -> Result<u32, BusError>;

    /// Write the low `width` bytes of `value` at `address`.
    fn write(
        &mut self,
        address: u32,
        width: AccessWidth,
        attributes: AccessAttributes,
        value: u32,
    ) -> Result<(), BusError>;
}
