//! GPU memory budget estimation
//!
//! Queries the two memory pools this workload touches for their *currently*
//! available budget and derives the single byte ceiling that bounds
//! admission. The snapshot is taken fresh on every load and never persisted.

use crate::error::ModelResult;
use crate::gpu::{GpuDevice, MemoryDomain};

/// Divisor applied to the smaller heap budget.
///
/// The same heaps later back descriptor and uniform allocations, so half the
/// reported budget is left as headroom. This is a tunable policy constant,
/// not derived from actual downstream allocation sizes; callers must not
/// assume the ceiling is tight.
pub const HEAP_HEADROOM_DIVISOR: u64 = 2;

/// Snapshot of the per-pool budgets backing one load operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    pub host_visible_available: u64,
    pub device_local_available: u64,
}

impl MemoryBudget {
    /// Query both pools through the device capability interface.
    ///
    /// A missing memory type surfaces as an explicit error; there is no
    /// fallback index.
    pub fn query(device: &dyn GpuDevice) -> ModelResult<Self> {
        let host_type = device.memory_type_index(MemoryDomain::HostVisible)?;
        let host_visible_available = device.heap_budget(host_type)?;

        let device_type = device.memory_type_index(MemoryDomain::DeviceLocal)?;
        let device_local_available = device.heap_budget(device_type)?;

        Ok(Self {
            host_visible_available,
            device_local_available,
        })
    }

    /// Usable byte ceiling for admission
    pub fn usable_ceiling(&self) -> u64 {
        self.host_visible_available
            .min(self.device_local_available)
            / HEAP_HEADROOM_DIVISOR
    }
}

/// Derive the admission ceiling from the device's current heap budgets.
pub fn estimate_ceiling(device: &dyn GpuDevice) -> ModelResult<u64> {
    let budget = MemoryBudget::query(device)?;
    let ceiling = budget.usable_ceiling();
    log::info!(
        "[Budget] host-visible {} B, device-local {} B -> ceiling {} B",
        budget.host_visible_available,
        budget.device_local_available,
        ceiling
    );
    Ok(ceiling)
}
