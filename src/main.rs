//! Universe model loader executable
//!
//! Drives one load end to end on a single thread: budget discovery,
//! descriptor read, streaming admission, pipeline build, and the
//! fence-synchronized upload. Any stage failure aborts before the next
//! stage runs, so a failed load never leaves a half-bound pipeline behind.

use anyhow::{Context, Result};
use ash::vk;

use gaia_universe_model::gpu::vulkan::VulkanDevice;
use gaia_universe_model::gpu::DeviceErrorContext;
use gaia_universe_model::{
    estimate_ceiling, load_records, read_model_descriptor, upload_model, FileRecordSource,
    ModelConfig, ModelPipeline,
};

fn main() -> Result<()> {
    env_logger::init();

    let mut config = ModelConfig::default();
    let mut args = std::env::args().skip(1);
    if let Some(descriptor) = args.next() {
        config.descriptor_path = descriptor.into();
    }
    if let Some(resources) = args.next() {
        config.resources_path = resources.into();
    }

    let descriptor = read_model_descriptor(&config.descriptor_path)
        .context("reading universe model descriptor")?;

    let device = VulkanDevice::new().context("initializing Vulkan")?;
    let ceiling = estimate_ceiling(&device).context("estimating memory budget")?;

    let source = FileRecordSource::new(&config.resources_path);
    let model = load_records(&source, descriptor.source_range, config.flags, ceiling)
        .context("loading universe model files")?;

    let render_pass = create_render_pass(&device)?;
    let extent = vk::Extent2D {
        width: config.surface_width,
        height: config.surface_height,
    };
    let pipeline = ModelPipeline::build(
        &device,
        render_pass,
        extent,
        &config.shaders,
        model.used_gpu_heap,
        model.celestial_body_size,
    )
    .context("building celestial body pipeline")?;

    let uploaded = match upload_model(&device, model, pipeline.model_buffer()) {
        Ok(uploaded) => uploaded,
        Err(e) => {
            pipeline.destroy(&device);
            unsafe { device.ash_device().destroy_render_pass(render_pass, None) };
            return Err(e).context("uploading universe model");
        }
    };

    log::info!(
        "universe model resident: {uploaded} bytes in device-local storage, \
         pipeline ready for binding"
    );

    pipeline.destroy(&device);
    unsafe { device.ash_device().destroy_render_pass(render_pass, None) };
    Ok(())
}

/// Single-subpass color-only render pass for the celestial body pipeline.
fn create_render_pass(device: &VulkanDevice) -> Result<vk::RenderPass> {
    let attachment = vk::AttachmentDescription {
        format: vk::Format::B8G8R8A8_UNORM,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_ref))
        .build();
    let info = vk::RenderPassCreateInfo::builder()
        .attachments(std::slice::from_ref(&attachment))
        .subpasses(std::slice::from_ref(&subpass));

    let render_pass = unsafe { device.ash_device().create_render_pass(&info, None) }
        .device_context("creating render pass")?;
    Ok(render_pass)
}
