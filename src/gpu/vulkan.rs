//! Vulkan backend for the device capability interface
//!
//! Owns the instance, logical device, graphics queue, and the per-load
//! command-buffer/fence pair. Heap budgets come from `VK_EXT_memory_budget`,
//! so the figures reflect what the driver will actually let this process
//! allocate right now, not the static heap capacity.

use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ash::vk;

use crate::error::{ModelError, ModelResult};
use crate::gpu::{BufferHandle, BufferKind, DeviceErrorContext, GpuDevice, MemoryDomain};

fn required_property_flags(domain: MemoryDomain) -> vk::MemoryPropertyFlags {
    match domain {
        MemoryDomain::HostVisible => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        }
        MemoryDomain::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
    }
}

fn usage_flags(kind: BufferKind) -> vk::BufferUsageFlags {
    match kind {
        BufferKind::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        BufferKind::Storage => {
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::STORAGE_BUFFER
        }
        BufferKind::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
    }
}

struct VulkanBuffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: u64,
    host_visible: bool,
}

/// Raw Vulkan implementation of [`GpuDevice`]
pub struct VulkanDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,

    buffers: Mutex<HashMap<u64, VulkanBuffer>>,
    next_id: AtomicU64,
}

impl VulkanDevice {
    /// Bring up the instance, pick a physical device with a graphics queue,
    /// and create the logical device plus the shared command-buffer/fence
    /// pair.
    pub fn new() -> ModelResult<Self> {
        let entry = unsafe { ash::Entry::load() }.device_context("loading Vulkan library")?;

        let app_name = unsafe { CStr::from_bytes_with_nul_unchecked(b"gaia-universe-model\0") };
        let app_info = vk::ApplicationInfo::builder()
            .application_name(app_name)
            .api_version(vk::API_VERSION_1_1);
        let instance_info = vk::InstanceCreateInfo::builder().application_info(&app_info);
        let instance = unsafe { entry.create_instance(&instance_info, None) }
            .device_context("creating Vulkan instance")?;

        let (physical_device, queue_family_index) = pick_physical_device(&instance)?;
        ensure_memory_budget_support(&instance, physical_device)?;

        let device_name = unsafe {
            let props = instance.get_physical_device_properties(physical_device);
            CStr::from_ptr(props.device_name.as_ptr())
                .to_string_lossy()
                .into_owned()
        };
        log::info!("[Vulkan] using {device_name}");

        let queue_priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)
            .build();
        let queue_infos = [queue_info];
        let extension_names = [vk::ExtMemoryBudgetFn::name().as_ptr()];
        let device_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names);
        let device = unsafe { instance.create_device(physical_device, &device_info, None) }
            .device_context("creating logical device")?;

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .device_context("creating command pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info) }
            .device_context("allocating command buffer")?[0];

        let fence_info = vk::FenceCreateInfo::builder();
        let fence = unsafe { device.create_fence(&fence_info, None) }
            .device_context("creating upload fence")?;

        Ok(Self {
            _entry: entry,
            instance,
            physical_device,
            device,
            queue,
            command_pool,
            command_buffer,
            fence,
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Raw device handle for the downstream pipeline builder
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }

    /// Raw `vk::Buffer` backing a handle, for descriptor writes
    pub fn raw_buffer(&self, handle: &BufferHandle) -> ModelResult<vk::Buffer> {
        let buffers = self.lock_buffers()?;
        buffers
            .get(&handle.id())
            .map(|b| b.buffer)
            .ok_or_else(|| ModelError::Device {
                operation: "raw_buffer".to_string(),
                reason: format!("unknown buffer handle {}", handle.id()),
            })
    }

    fn lock_buffers(&self) -> ModelResult<std::sync::MutexGuard<'_, HashMap<u64, VulkanBuffer>>> {
        self.buffers.lock().map_err(|_| ModelError::LockPoisoned {
            resource: "vulkan::buffers".to_string(),
        })
    }

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        unsafe {
            self.instance
                .get_physical_device_memory_properties(self.physical_device)
        }
    }

    /// Memory type satisfying both the buffer's requirement bits and the
    /// domain's property flags.
    fn memory_type_for(
        &self,
        requirement_bits: u32,
        domain: MemoryDomain,
    ) -> ModelResult<u32> {
        let required = required_property_flags(domain);
        let properties = self.memory_properties();
        (0..properties.memory_type_count)
            .find(|&i| {
                requirement_bits & (1 << i) != 0
                    && properties.memory_types[i as usize]
                        .property_flags
                        .contains(required)
            })
            .ok_or(ModelError::NoMatchingMemoryType { domain })
    }
}

impl GpuDevice for VulkanDevice {
    fn memory_type_index(&self, domain: MemoryDomain) -> ModelResult<u32> {
        let required = required_property_flags(domain);
        let properties = self.memory_properties();
        (0..properties.memory_type_count)
            .find(|&i| {
                properties.memory_types[i as usize]
                    .property_flags
                    .contains(required)
            })
            .ok_or(ModelError::NoMatchingMemoryType { domain })
    }

    fn heap_budget(&self, memory_type_index: u32) -> ModelResult<u64> {
        let properties = self.memory_properties();
        if memory_type_index >= properties.memory_type_count {
            return Err(ModelError::Device {
                operation: "heap_budget".to_string(),
                reason: format!("memory type index {memory_type_index} out of range"),
            });
        }
        let heap_index =
            properties.memory_types[memory_type_index as usize].heap_index as usize;

        let mut budget = vk::PhysicalDeviceMemoryBudgetPropertiesEXT::default();
        let mut props2 = vk::PhysicalDeviceMemoryProperties2::builder()
            .push_next(&mut budget)
            .build();
        unsafe {
            self.instance
                .get_physical_device_memory_properties2(self.physical_device, &mut props2);
        }

        Ok(budget.heap_budget[heap_index])
    }

    fn create_buffer(
        &self,
        size: u64,
        kind: BufferKind,
        domain: MemoryDomain,
    ) -> ModelResult<BufferHandle> {
        // Vulkan forbids zero-sized buffers; allocate a single byte so an
        // empty admission set still round-trips through the same path.
        let vk_size = size.max(1);

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(vk_size)
            .usage(usage_flags(kind))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .device_context("creating buffer")?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory_type = match self.memory_type_for(requirements.memory_type_bits, domain) {
            Ok(index) => index,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = match unsafe { self.device.allocate_memory(&alloc_info, None) }
            .device_context("allocating buffer memory")
        {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }
            .device_context("binding buffer memory")
        {
            unsafe {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            }
            return Err(e);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_buffers()?.insert(
            id,
            VulkanBuffer {
                buffer,
                memory,
                size,
                host_visible: domain == MemoryDomain::HostVisible,
            },
        );

        Ok(BufferHandle::new(id, size))
    }

    fn write_buffer(&self, buffer: &BufferHandle, data: &[u8]) -> ModelResult<()> {
        let buffers = self.lock_buffers()?;
        let entry = buffers.get(&buffer.id()).ok_or_else(|| ModelError::Device {
            operation: "write_buffer".to_string(),
            reason: format!("unknown buffer handle {}", buffer.id()),
        })?;
        if !entry.host_visible {
            return Err(ModelError::Device {
                operation: "write_buffer".to_string(),
                reason: "buffer is not host-visible".to_string(),
            });
        }
        if data.len() as u64 > entry.size {
            return Err(ModelError::Device {
                operation: "write_buffer".to_string(),
                reason: format!("{} bytes into a {} byte buffer", data.len(), entry.size),
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        // Host-coherent memory: no explicit flush needed after the copy.
        unsafe {
            let ptr = self
                .device
                .map_memory(
                    entry.memory,
                    0,
                    data.len() as u64,
                    vk::MemoryMapFlags::empty(),
                )
                .device_context("mapping staging memory")?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len());
            self.device.unmap_memory(entry.memory);
        }
        Ok(())
    }

    fn read_buffer(&self, buffer: &BufferHandle) -> ModelResult<Vec<u8>> {
        let buffers = self.lock_buffers()?;
        let entry = buffers.get(&buffer.id()).ok_or_else(|| ModelError::Device {
            operation: "read_buffer".to_string(),
            reason: format!("unknown buffer handle {}", buffer.id()),
        })?;
        if !entry.host_visible {
            return Err(ModelError::Device {
                operation: "read_buffer".to_string(),
                reason: "buffer is not host-visible".to_string(),
            });
        }

        let mut out = vec![0u8; entry.size as usize];
        if entry.size > 0 {
            unsafe {
                let ptr = self
                    .device
                    .map_memory(entry.memory, 0, entry.size, vk::MemoryMapFlags::empty())
                    .device_context("mapping memory for readback")?;
                std::ptr::copy_nonoverlapping(ptr as *const u8, out.as_mut_ptr(), out.len());
                self.device.unmap_memory(entry.memory);
            }
        }
        Ok(out)
    }

    fn reset_fence(&self) -> ModelResult<()> {
        unsafe { self.device.reset_fences(std::slice::from_ref(&self.fence)) }
            .device_context("resetting upload fence")
    }

    fn submit_copy(&self, src: &BufferHandle, dst: &BufferHandle, size: u64) -> ModelResult<()> {
        let (src_raw, dst_raw) = {
            let buffers = self.lock_buffers()?;
            let lookup = |handle: &BufferHandle| {
                buffers
                    .get(&handle.id())
                    .map(|b| b.buffer)
                    .ok_or_else(|| ModelError::Device {
                        operation: "submit_copy".to_string(),
                        reason: format!("unknown buffer handle {}", handle.id()),
                    })
            };
            (lookup(src)?, lookup(dst)?)
        };

        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .device_context("resetting command buffer")?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .device_context("beginning command buffer")?;

            if size > 0 {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                };
                self.device.cmd_copy_buffer(
                    self.command_buffer,
                    src_raw,
                    dst_raw,
                    std::slice::from_ref(&region),
                );
            }

            self.device
                .end_command_buffer(self.command_buffer)
                .device_context("ending command buffer")?;

            let submit_info = vk::SubmitInfo::builder()
                .command_buffers(std::slice::from_ref(&self.command_buffer))
                .build();
            self.device
                .queue_submit(self.queue, std::slice::from_ref(&submit_info), self.fence)
                .device_context("submitting upload commands")?;
        }
        Ok(())
    }

    fn wait_fence(&self, timeout: Duration) -> ModelResult<()> {
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let result = unsafe {
            self.device
                .wait_for_fences(std::slice::from_ref(&self.fence), true, nanos)
        };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(ModelError::FenceTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(e) => Err(ModelError::Device {
                operation: "waiting for upload fence".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let entry = match self.lock_buffers() {
            Ok(mut buffers) => buffers.remove(&buffer.id()),
            Err(_) => None,
        };
        if let Some(entry) = entry {
            unsafe {
                self.device.destroy_buffer(entry.buffer, None);
                self.device.free_memory(entry.memory, None);
            }
        } else {
            log::warn!("[Vulkan] destroy of unknown buffer handle {}", buffer.id());
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            if let Ok(mut buffers) = self.buffers.lock() {
                for (id, entry) in buffers.drain() {
                    log::warn!("[Vulkan] buffer {id} leaked past its owner, releasing");
                    self.device.destroy_buffer(entry.buffer, None);
                    self.device.free_memory(entry.memory, None);
                }
            }
            self.device.destroy_fence(self.fence, None);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// First physical device with a graphics queue, preferring discrete GPUs.
fn pick_physical_device(instance: &ash::Instance) -> ModelResult<(vk::PhysicalDevice, u32)> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .device_context("enumerating physical devices")?;

    let mut fallback = None;
    for device in devices {
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };
        let graphics_family = families
            .iter()
            .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS));
        let Some(family) = graphics_family else {
            continue;
        };

        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            return Ok((device, family as u32));
        }
        fallback.get_or_insert((device, family as u32));
    }

    fallback.ok_or_else(|| ModelError::Device {
        operation: "selecting physical device".to_string(),
        reason: "no device with a graphics queue".to_string(),
    })
}

/// The budget query is meaningless without `VK_EXT_memory_budget`; refuse to
/// run with a static-capacity stand-in.
fn ensure_memory_budget_support(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> ModelResult<()> {
    let extensions =
        unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .device_context("enumerating device extensions")?;
    let wanted = vk::ExtMemoryBudgetFn::name();
    let supported = extensions.iter().any(|ext| {
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == wanted
    });
    if supported {
        Ok(())
    } else {
        Err(ModelError::Device {
            operation: "checking device extensions".to_string(),
            reason: format!("{} not supported", wanted.to_string_lossy()),
        })
    }
}
