//! Interface to the GPU storage buffers meshes are uploaded into.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Descriptor location of a storage buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferBinding {
    pub set: u32,
    pub binding: u32,
}

impl BufferBinding {
    pub const fn new(set: u32, binding: u32) -> Self {
        Self { set, binding }
    }
}

/// Sink for byte writes into storage buffers.
pub trait StorageBufferWriter {
    /// Copy `bytes` into the buffer at `binding`, starting at `offset`.
    fn write(&mut self, binding: BufferBinding, offset: u64, bytes: &[u8]);
}

/// Per-binding write totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BindingTraffic {
    pub writes: usize,
    pub bytes: u64,
}

/// Writer that only counts traffic, for headless runs.
#[derive(Debug, Default)]
pub struct CountingWriter {
    traffic: HashMap<BufferBinding, BindingTraffic>,
}

impl CountingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals for one binding
    pub fn traffic(&self, binding: BufferBinding) -> BindingTraffic {
        self.traffic.get(&binding).copied().unwrap_or_default()
    }

    /// Bytes written across every binding
    pub fn total_bytes(&self) -> u64 {
        self.traffic.values().map(|t| t.bytes).sum()
    }

    /// Forget all totals.
    pub fn reset(&mut self) {
        self.traffic.clear();
    }
}

impl StorageBufferWriter for CountingWriter {
    fn write(&mut self, binding: BufferBinding, _offset: u64, bytes: &[u8]) {
        let entry = self.traffic.entry(binding).or_default();
        entry.writes += 1;
        entry.bytes += bytes.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_writer_totals() {
        let mut writer = CountingWriter::new();
        let a = BufferBinding::new(0, 1);
        writer.write(a, 0, &[1, 2, 3]);
        writer.write(a, 16, &[4]);
        writer.write(BufferBinding::new(1, 0), 0, &[0; 8]);
        assert_eq!(writer.traffic(a), BindingTraffic { writes: 2, bytes: 4 });
        assert_eq!(writer.total_bytes(), 12);
        writer.reset();
        assert_eq!(writer.total_bytes(), 0);
    }
}
