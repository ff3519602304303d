//! Celestial body rendering pipeline builder
//!
//! Downstream collaborator of the loader core: binds the uploaded model
//! buffer for consumption by the vertex stage. Set 0 carries the storage
//! buffer sized to the admitted bytes, set 1 a small uniform block for the
//! fragment stage; a 128-byte vertex push-constant range carries per-frame
//! camera state. Consumes `(used bytes, record size)` and hands nothing
//! back to the core.

use std::ffi::CString;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use ash::vk;

use crate::error::{ModelError, ModelResult};
use crate::gpu::vulkan::VulkanDevice;
use crate::gpu::{BufferHandle, BufferKind, GpuDevice, MemoryDomain};

/// Size of the fragment-stage uniform block
const UNIFORM_BLOCK_SIZE: u64 = 16;

/// Size of the vertex-stage push-constant range
const PUSH_CONSTANT_SIZE: u32 = 128;

/// SPIR-V binaries for the celestial body shaders
#[derive(Debug, Clone)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("assets/shaders/bin/celestial_body.vert.spv"),
            fragment: PathBuf::from("assets/shaders/bin/celestial_body.frag.spv"),
        }
    }
}

/// Built pipeline state plus the device buffers it binds.
///
/// The model storage buffer is created here (it is the upload destination)
/// and owned here afterwards; call [`ModelPipeline::destroy`] when done.
pub struct ModelPipeline {
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    set_layouts: [vk::DescriptorSetLayout; 2],
    descriptor_pool: vk::DescriptorPool,
    descriptor_sets: [vk::DescriptorSet; 2],

    model_buffer: Option<BufferHandle>,
    uniform_buffer: Option<BufferHandle>,

    pub used_gpu_heap: u64,
    pub record_size: u64,
}

impl ModelPipeline {
    /// Configure descriptors, shader stages, fixed state, and the graphics
    /// pipeline for the given admitted byte count.
    pub fn build(
        vk_device: &VulkanDevice,
        render_pass: vk::RenderPass,
        surface_extent: vk::Extent2D,
        shaders: &ShaderPaths,
        used_gpu_heap: u64,
        record_size: u64,
    ) -> ModelResult<Self> {
        log::info!("[Pipeline] building celestial body pipeline");
        let device = vk_device.ash_device();

        // Destination storage for the admitted bytes, plus the uniform block.
        let model_buffer =
            vk_device.create_buffer(used_gpu_heap, BufferKind::Storage, MemoryDomain::DeviceLocal)?;
        let uniform_buffer = vk_device.create_buffer(
            UNIFORM_BLOCK_SIZE,
            BufferKind::Uniform,
            MemoryDomain::HostVisible,
        )?;

        let storage_binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build();
        let uniform_binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build();

        let storage_layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(std::slice::from_ref(&storage_binding));
        let uniform_layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(std::slice::from_ref(&uniform_binding));
        let set_layouts = unsafe {
            [
                device
                    .create_descriptor_set_layout(&storage_layout_info, None)
                    .map_err(|e| device_err("creating storage set layout", e))?,
                device
                    .create_descriptor_set_layout(&uniform_layout_info, None)
                    .map_err(|e| device_err("creating uniform set layout", e))?,
            ]
        };

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 1,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1,
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(2)
            .pool_sizes(&pool_sizes);
        let descriptor_pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .map_err(|e| device_err("creating descriptor pool", e))?;

        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(descriptor_pool)
            .set_layouts(&set_layouts);
        let sets = unsafe { device.allocate_descriptor_sets(&alloc_info) }
            .map_err(|e| device_err("allocating descriptor sets", e))?;
        let descriptor_sets = [sets[0], sets[1]];

        let storage_info = vk::DescriptorBufferInfo {
            buffer: vk_device.raw_buffer(&model_buffer)?,
            offset: 0,
            range: used_gpu_heap.max(1),
        };
        let uniform_info = vk::DescriptorBufferInfo {
            buffer: vk_device.raw_buffer(&uniform_buffer)?,
            offset: 0,
            range: UNIFORM_BLOCK_SIZE,
        };
        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(descriptor_sets[0])
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(std::slice::from_ref(&storage_info))
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(descriptor_sets[1])
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(std::slice::from_ref(&uniform_info))
                .build(),
        ];
        unsafe { device.update_descriptor_sets(&writes, &[]) };

        let push_constant_range = vk::PushConstantRange::builder()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(PUSH_CONSTANT_SIZE)
            .build();
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(std::slice::from_ref(&push_constant_range));
        let pipeline_layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| device_err("creating pipeline layout", e))?;

        let vertex_module = load_shader_module(device, &shaders.vertex)?;
        let fragment_module = load_shader_module(device, &shaders.fragment)?;

        let entry_name = CString::new("main").map_err(|e| ModelError::Device {
            operation: "shader entry name".to_string(),
            reason: e.to_string(),
        })?;
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module)
                .name(&entry_name)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module)
                .name(&entry_name)
                .build(),
        ];

        // Fixed states: no vertex input (the vertex stage indexes the
        // storage buffer directly), triangle list, fill, full-surface
        // viewport.
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: surface_extent.width as f32,
            height: surface_extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: surface_extent,
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(std::slice::from_ref(&viewport))
            .scissors(std::slice::from_ref(&scissor));
        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let blend_attachment = vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .attachments(std::slice::from_ref(&blend_attachment));

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .layout(pipeline_layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();
        let pipeline_result = unsafe {
            device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_info),
                None,
            )
        };

        // Modules are owned by the pipeline once creation returns.
        unsafe {
            device.destroy_shader_module(vertex_module, None);
            device.destroy_shader_module(fragment_module, None);
        }

        let pipeline = match pipeline_result {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => return Err(device_err("creating graphics pipeline", e)),
        };

        Ok(Self {
            pipeline,
            pipeline_layout,
            set_layouts,
            descriptor_pool,
            descriptor_sets,
            model_buffer: Some(model_buffer),
            uniform_buffer: Some(uniform_buffer),
            used_gpu_heap,
            record_size,
        })
    }

    /// Destination buffer for the upload pipeline
    pub fn model_buffer(&self) -> &BufferHandle {
        self.model_buffer
            .as_ref()
            .unwrap_or_else(|| unreachable!("model buffer taken before destroy"))
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    pub fn descriptor_sets(&self) -> &[vk::DescriptorSet; 2] {
        &self.descriptor_sets
    }

    /// Release all pipeline state and the buffers it owns.
    pub fn destroy(mut self, vk_device: &VulkanDevice) {
        let device = vk_device.ash_device();
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            for layout in self.set_layouts {
                device.destroy_descriptor_set_layout(layout, None);
            }
        }
        if let Some(buffer) = self.model_buffer.take() {
            vk_device.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.uniform_buffer.take() {
            vk_device.destroy_buffer(buffer);
        }
    }
}

fn device_err(operation: &str, e: vk::Result) -> ModelError {
    ModelError::Device {
        operation: operation.to_string(),
        reason: e.to_string(),
    }
}

fn load_shader_module(device: &ash::Device, path: &Path) -> ModelResult<vk::ShaderModule> {
    let bytes = std::fs::read(path).map_err(|e| ModelError::Device {
        operation: "reading shader binary".to_string(),
        reason: format!("{}: {}", path.display(), e),
    })?;
    let code = ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(|e| ModelError::Device {
        operation: "parsing shader binary".to_string(),
        reason: format!("{}: {}", path.display(), e),
    })?;
    let info = vk::ShaderModuleCreateInfo::builder().code(&code);
    unsafe { device.create_shader_module(&info, None) }
        .map_err(|e| device_err("creating shader module", e))
}
