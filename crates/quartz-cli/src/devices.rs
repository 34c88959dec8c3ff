//! Demo leaf devices and the factory that resolves `device = "..."` names.
//!
//! - `cpu`: fetch loop over a flash region through [`FlatMemory`]
//! - `counter`: counts its invocations

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use quartz_config::{ConfigError, NodeConfig};
use quartz_core::{
    AccessAttributes, AccessWidth, AddressSpace, BusError, DEFAULT_CONSUMED_CYCLES, Leaf,
};
use thiserror::Error;

/// Device names the factory understands.
pub const KNOWN_DEVICES: &[&str] = &["cpu", "counter"];

/// Flash base address of the demo memory map.
pub const FLASH_BASE: u32 = 0x0800_0000;
/// SRAM base address of the demo memory map.
pub const SRAM_BASE: u32 = 0x2000_0000;

/// Region mapping failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    /// The new region overlaps an existing one.
    #[error("region {base:#010x}+{len:#x} overlaps an existing region")]
    Overlap {
        /// Base of the rejected region.
        base: u32,
        /// Length of the rejected region.
        len: u32,
    },
    /// The region runs past the end of the 32-bit address space.
    #[error("region {base:#010x}+{len:#x} wraps the address space")]
    Wraps {
        /// Base of the rejected region.
        base: u32,
        /// Length of the rejected region.
        len: u32,
    },
}

struct Region {
    base: u32,
    attributes: AccessAttributes,
    bytes: Vec<u8>,
}

impl Region {
    fn end(&self) -> u64 {
        u64::from(self.base) + self.bytes.len() as u64
    }
}

/// Byte-addressed memory made of non-overlapping regions.
#[derive(Default)]
pub struct FlatMemory {
    regions: Vec<Region>,
}

impl FlatMemory {
    /// Empty memory map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `bytes` at `base` with the given permissions.
    pub fn map(
        &mut self,
        base: u32,
        bytes: Vec<u8>,
        attributes: AccessAttributes,
    ) -> Result<(), MapError> {
        let len = bytes.len() as u32;
        let end = u64::from(base) + bytes.len() as u64;
        if end > u64::from(u32::MAX) + 1 {
            return Err(MapError::Wraps { base, len });
        }
        if self
            .regions
            .iter()
            .any(|r| u64::from(base) < r.end() && u64::from(r.base) < end)
        {
            return Err(MapError::Overlap { base, len });
        }
        self.regions.push(Region {
            base,
            attributes,
            bytes,
        });
        Ok(())
    }

    /// Demo map: execute-only flash holding `program`, plus read/write SRAM.
    pub fn demo(program: &[u16], sram_len: usize) -> Result<Self, MapError> {
        let flash: Vec<u8> = program.iter().flat_map(|op| op.to_le_bytes()).collect();
        let mut memory = Self::new();
        let flash_attrs = AccessAttributes::SUPERVISOR_READ
            | AccessAttributes::SUPERVISOR_EXECUTE
            | AccessAttributes::SUPERVISOR_CACHEABLE;
        let sram_attrs = AccessAttributes::USER_READ
            | AccessAttributes::USER_WRITE
            | AccessAttributes::SUPERVISOR_READ
            | AccessAttributes::SUPERVISOR_WRITE;
        memory.map(FLASH_BASE, flash, flash_attrs)?;
        memory.map(SRAM_BASE, vec![0; sram_len], sram_attrs)?;
        Ok(memory)
    }

    fn locate(
        &self,
        address: u32,
        width: AccessWidth,
        attributes: AccessAttributes,
    ) -> Result<(usize, usize), BusError> {
        let end = u64::from(address) + u64::from(width.bytes());
        let (i, region) = self
            .regions
            .iter()
            .enumerate()
            .find(|(_, r)| u64::from(address) >= u64::from(r.base) && end <= r.end())
            .ok_or(BusError::Unmapped { address })?;
        if !region.attributes.permits(attributes) {
            return Err(BusError::AttributeViolation {
                address,
                requested: attributes,
                granted: region.attributes,
            });
        }
        Ok((i, (address - region.base) as usize))
    }
}

impl AddressSpace for FlatMemory {
    fn read(
        &self,
        address: u32,
        width: AccessWidth,
        attributes: AccessAttributes,
    ) -> Result<u32, BusError> {
        let (i, offset) = self.locate(address, width, attributes)?;
        let bytes = &self.regions[i].bytes[offset..offset + width.bytes() as usize];
        Ok(bytes
            .iter()
            .rev()
            .fold(0, |acc, &b| (acc << 8) | u32::from(b)))
    }

    fn write(
        &mut self,
        address: u32,
        width: AccessWidth,
        attributes: AccessAttributes,
        value: u32,
    ) -> Result<(), BusError> {
        let (i, offset) = self.locate(address, width, attributes)?;
        let n = width.bytes() as usize;
        let bytes = (value & width.mask()).to_le_bytes();
        self.regions[i].bytes[offset..offset + n].copy_from_slice(&bytes[..n]);
        Ok(())
    }
}

/// Shared invocation counters of one device.
#[derive(Debug, Default)]
pub struct DeviceStats {
    /// Successful invocations (fetches for the CPU).
    pub hits: AtomicU64,
    /// Bus faults (CPU only).
    pub faults: AtomicU64,
}

/// Fetch-loop CPU: one 16-bit opcode per cycle from its PC.
///
/// A fetch fault restarts at the reset vector.
pub struct FetchCpu<M> {
    memory: M,
    reset_vector: u32,
    pc: u32,
    stats: Arc<DeviceStats>,
}

impl<M: AddressSpace> FetchCpu<M> {
    /// CPU starting at `reset_vector`.
    pub fn new(memory: M, reset_vector: u32, stats: Arc<DeviceStats>) -> Self {
        Self {
            memory,
            reset_vector,
            pc: reset_vector,
            stats,
        }
    }

    /// Current program counter.
    pub fn pc(&self) -> u32 {
        self.pc
    }
}

impl<M: AddressSpace> Leaf for FetchCpu<M> {
    fn run(&mut self, _available_cycles: u32) -> u32 {
        match self.memory.read(
            self.pc,
            AccessWidth::Half,
            AccessAttributes::SUPERVISOR_EXECUTE,
        ) {
            Ok(_opcode) => {
                self.pc = self.pc.wrapping_add(2);
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                tracing::trace!(pc = self.pc, %err, "fetch fault, resetting");
                self.pc = self.reset_vector;
                self.stats.faults.fetch_add(1, Ordering::Relaxed);
            }
        }
        DEFAULT_CONSUMED_CYCLES
    }
}

/// Counts invocations.
pub struct Counter {
    stats: Arc<DeviceStats>,
}

impl Leaf for Counter {
    fn run(&mut self, _available_cycles: u32) -> u32 {
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        DEFAULT_CONSUMED_CYCLES
    }
}

/// Demo program: 32 no-ops; the CPU faults off the end and restarts.
fn demo_program() -> Vec<u16> {
    vec![0xBF00; 32]
}

/// Creates demo leaves by device name and keeps their counters.
#[derive(Default)]
pub struct DeviceFactory {
    created: Vec<(usize, String, Arc<DeviceStats>)>,
}

impl DeviceFactory {
    /// Empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaf for `node`, or [`ConfigError::UnknownDevice`].
    pub fn create(&mut self, node: &NodeConfig) -> Result<Box<dyn Leaf>, ConfigError> {
        let device = node.device.as_deref().unwrap_or_default();
        let stats = Arc::new(DeviceStats::default());
        let leaf: Box<dyn Leaf> = match device {
            "cpu" => {
                let memory = FlatMemory::demo(&demo_program(), 4096)
                    .map_err(|e| ConfigError::device_setup(node.index, device, e))?;
                Box::new(FetchCpu::new(memory, FLASH_BASE, Arc::clone(&stats)))
            }
            "counter" => Box::new(Counter {
                stats: Arc::clone(&stats),
            }),
            other => return Err(ConfigError::unknown_device(node.index, other)),
        };
        self.created.push((node.index, node.display_name(), stats));
        Ok(leaf)
    }

    /// `(index, name, stats)` of every device created so far.
    pub fn devices(&self) -> &[(usize, String, Arc<DeviceStats>)] {
        &self.created
    }
}
