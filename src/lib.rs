//! gaia-universe-model
//!
//! Loads the file-backed Gaia celestial body catalog into a fixed GPU memory
//! budget and uploads the admitted bytes to device-local storage for
//! rendering. The budget is discovered fresh per load from the current heap
//! budgets; admission streams variable-sized record halves into a
//! ceiling-bounded host buffer; the upload stages, copies, and fences before
//! any staging memory is reclaimed.

pub mod budget;
pub mod descriptor;
pub mod error;
pub mod gpu;
pub mod loader;
pub mod pipeline;
pub mod records;
pub mod upload;

use std::path::PathBuf;

pub use budget::{estimate_ceiling, MemoryBudget, HEAP_HEADROOM_DIVISOR};
pub use descriptor::{read_model_descriptor, ModelDescriptor, SourceRange};
pub use error::{ModelError, ModelResult};
pub use gpu::{BufferHandle, BufferKind, GpuDevice, MemoryDomain};
pub use loader::{load_records, UniverseModelMemory};
pub use pipeline::{ModelPipeline, ShaderPaths};
pub use records::{
    celestial_body_size, CelestialBodyFlags, CelestialBodyRecord, FileRecordSource, RecordSource,
};
pub use upload::{upload_model, UPLOAD_FENCE_TIMEOUT};

/// Top-level configuration for one load operation
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// JSON descriptor naming the source identifier range
    pub descriptor_path: PathBuf,
    /// Directory holding the binary record halves
    pub resources_path: PathBuf,
    /// Sub-field selection applied to every fetched record
    pub flags: CelestialBodyFlags,
    /// Compiled shader binaries for the render pipeline
    pub shaders: ShaderPaths,
    /// Render surface dimensions for the fixed pipeline state
    pub surface_width: u32,
    pub surface_height: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            descriptor_path: PathBuf::from("gaia-resources/model-descriptor.json"),
            resources_path: PathBuf::from("gaia-resources"),
            flags: CelestialBodyFlags::ALL,
            shaders: ShaderPaths::default(),
            surface_width: 1280,
            surface_height: 720,
        }
    }
}
