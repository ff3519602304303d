//! Shared test doubles: an in-memory device implementing the capability
//! trait and a map-backed record source.

// Each integration test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

use gaia_universe_model::{
    BufferHandle, BufferKind, CelestialBodyFlags, GpuDevice, MemoryDomain, ModelError,
    ModelResult, RecordSource,
};

pub struct TestBuffer {
    pub data: Vec<u8>,
    pub kind: BufferKind,
    pub domain: MemoryDomain,
}

/// Deterministic in-memory device with failure injection.
///
/// Memory type indices: 0 = device-local, 1 = host-visible.
pub struct TestDevice {
    pub host_budget: u64,
    pub device_budget: u64,

    buffers: RefCell<HashMap<u64, TestBuffer>>,
    next_id: Cell<u64>,
    fence_signaled: Cell<bool>,

    pub fail_submit: Cell<bool>,
    pub hang_fence: Cell<bool>,
}

impl TestDevice {
    pub fn new(host_budget: u64, device_budget: u64) -> Self {
        Self {
            host_budget,
            device_budget,
            buffers: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            fence_signaled: Cell::new(false),
            fail_submit: Cell::new(false),
            hang_fence: Cell::new(false),
        }
    }

    /// IDs of buffers that have been created but not destroyed
    pub fn live_buffers(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.buffers.borrow().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn buffer_contents(&self, handle: &BufferHandle) -> Vec<u8> {
        self.buffers.borrow()[&handle.id()].data.clone()
    }
}

impl GpuDevice for TestDevice {
    fn memory_type_index(&self, domain: MemoryDomain) -> ModelResult<u32> {
        Ok(match domain {
            MemoryDomain::DeviceLocal => 0,
            MemoryDomain::HostVisible => 1,
        })
    }

    fn heap_budget(&self, memory_type_index: u32) -> ModelResult<u64> {
        Ok(match memory_type_index {
            1 => self.host_budget,
            _ => self.device_budget,
        })
    }

    fn create_buffer(
        &self,
        size: u64,
        kind: BufferKind,
        domain: MemoryDomain,
    ) -> ModelResult<BufferHandle> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.buffers.borrow_mut().insert(
            id,
            TestBuffer {
                data: vec![0; size as usize],
                kind,
                domain,
            },
        );
        Ok(BufferHandle::new(id, size))
    }

    fn write_buffer(&self, buffer: &BufferHandle, data: &[u8]) -> ModelResult<()> {
        let mut buffers = self.buffers.borrow_mut();
        let entry = buffers.get_mut(&buffer.id()).ok_or_else(|| ModelError::Device {
            operation: "write_buffer".to_string(),
            reason: format!("unknown buffer {}", buffer.id()),
        })?;
        if entry.domain != MemoryDomain::HostVisible {
            return Err(ModelError::Device {
                operation: "write_buffer".to_string(),
                reason: "buffer is not host-visible".to_string(),
            });
        }
        entry.data[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: &BufferHandle) -> ModelResult<Vec<u8>> {
        self.buffers
            .borrow()
            .get(&buffer.id())
            .map(|entry| entry.data.clone())
            .ok_or_else(|| ModelError::Device {
                operation: "read_buffer".to_string(),
                reason: format!("unknown buffer {}", buffer.id()),
            })
    }

    fn reset_fence(&self) -> ModelResult<()> {
        self.fence_signaled.set(false);
        Ok(())
    }

    fn submit_copy(&self, src: &BufferHandle, dst: &BufferHandle, size: u64) -> ModelResult<()> {
        if self.fail_submit.get() {
            return Err(ModelError::Device {
                operation: "submit_copy".to_string(),
                reason: "injected submit failure".to_string(),
            });
        }

        let mut buffers = self.buffers.borrow_mut();
        let source = buffers[&src.id()].data[..size as usize].to_vec();
        let dst_entry = buffers.get_mut(&dst.id()).ok_or_else(|| ModelError::Device {
            operation: "submit_copy".to_string(),
            reason: format!("unknown buffer {}", dst.id()),
        })?;
        dst_entry.data[..size as usize].copy_from_slice(&source);

        if !self.hang_fence.get() {
            self.fence_signaled.set(true);
        }
        Ok(())
    }

    fn wait_fence(&self, timeout: Duration) -> ModelResult<()> {
        if self.fence_signaled.get() {
            Ok(())
        } else {
            Err(ModelError::FenceTimeout {
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        self.buffers.borrow_mut().remove(&buffer.id());
    }
}

/// Record source backed by an explicit `(id, half) -> payload` map.
pub struct MapRecordSource {
    halves: HashMap<(u32, u8), Vec<u8>>,
    fail_at: Option<(u32, u8)>,
}

impl MapRecordSource {
    pub fn new() -> Self {
        Self {
            halves: HashMap::new(),
            fail_at: None,
        }
    }

    pub fn with_half(mut self, id: u32, half: u8, payload: Vec<u8>) -> Self {
        self.halves.insert((id, half), payload);
        self
    }

    /// Same fixed payload for every half of every id in `[0, ids)`
    pub fn uniform(ids: u32, payload: &[u8]) -> Self {
        let mut source = Self::new();
        for id in 0..ids {
            for half in 0..2 {
                source.halves.insert((id, half), payload.to_vec());
            }
        }
        source
    }

    pub fn failing_at(mut self, id: u32, half: u8) -> Self {
        self.fail_at = Some((id, half));
        self
    }
}

impl RecordSource for MapRecordSource {
    fn fetch(&self, id: u32, half: u8, _flags: CelestialBodyFlags) -> ModelResult<Vec<u8>> {
        if self.fail_at == Some((id, half)) {
            return Err(ModelError::RecordFetch {
                id,
                half,
                reason: "injected fetch failure".to_string(),
            });
        }
        self.halves
            .get(&(id, half))
            .cloned()
            .ok_or_else(|| ModelError::RecordFetch {
                id,
                half,
                reason: "no payload registered".to_string(),
            })
    }
}
