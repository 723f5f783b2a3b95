//! wgpu compute backend.
//!
//! Kernel contract for WGSL programs:
//! - argument slot `N` is `@group(0) @binding(N)`
//! - every sub-dispatch gets `struct { offset: u32, count: u32 }` (16 bytes,
//!   padded) at `@group(1) @binding(0)`; the work item id is
//!   `offset + global_invocation_id.x`
//! - the work-group size comes from `override WORKGROUP_SIZE: u32;`
//!   used as `@workgroup_size(WORKGROUP_SIZE)`
//!
//! Pipelines use layouts derived from the shader, so the kernel must
//! reference every bound slot.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use super::{
    BufferDesc, BufferHandle, BufferKind, ComputeBackend, DispatchRange, ImageDesc,
    ImageHandle, KernelHandle, ProgramHandle, Resource,
};
use crate::util::{Error, Result};

struct GpuBuffer {
    label: String,
    buffer: wgpu::Buffer,
    size: u64,
}

struct GpuImage {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuKernel {
    entry: String,
    program: usize,
    args: BTreeMap<u32, Resource>,
    /// One pipeline per work-group size.
    pipelines: HashMap<usize, wgpu::ComputePipeline>,
}

#[derive(Default)]
struct State {
    buffers: Vec<Option<GpuBuffer>>,
    images: Vec<Option<GpuImage>>,
    programs: Vec<wgpu::ShaderModule>,
    kernels: Vec<GpuKernel>,
}

/// Compute backend on a wgpu device.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    state: Mutex<State>,
}

impl WgpuBackend {
    /// Open a device. `device_index` selects from the enumerated adapters;
    /// `None` picks the high-performance default.
    pub fn new(device_index: Option<usize>) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = match device_index {
            Some(index) => instance
                .enumerate_adapters(wgpu::Backends::all())
                .into_iter()
                .nth(index)
                .ok_or_else(|| Error::NoAdapter(format!("no adapter at index {index}")))?,
            None => pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            }))
            .map_err(|e| Error::NoAdapter(e.to_string()))?,
        };

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "opening compute device");

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("epsilon device"),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .map_err(|e| Error::Context(e.to_string()))?;

        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
            state: Mutex::new(State::default()),
        })
    }

    /// Run `f` inside a validation error scope.
    fn scoped<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error)
    }

    fn ensure_pipeline(&self, state: &mut State, kernel: KernelHandle, local: usize) -> Result<()> {
        let State { programs, kernels, .. } = state;
        let k = kernels
            .get_mut(kernel.0 as usize)
            .ok_or_else(|| Error::Device(format!("unknown kernel {}", kernel.0)))?;
        if k.pipelines.contains_key(&local) {
            return Ok(());
        }

        let label = format!("{}_wg{}", k.entry, local);
        let constants = [("WORKGROUP_SIZE", local as f64)];
        let (pipeline, error) = self.scoped(|| {
            self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label.as_str()),
                layout: None,
                module: &programs[k.program],
                entry_point: Some(k.entry.as_str()),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &constants,
                    zero_initialize_workgroup_memory: true,
                },
                cache: None,
            })
        });
        if let Some(e) = error {
            return Err(Error::Kernel {
                entry: k.entry.clone(),
                reason: e.to_string(),
            });
        }
        k.pipelines.insert(local, pipeline);
        Ok(())
    }
}

/// One `dispatch_workgroups` call of a sub-dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Chunk {
    offset: u32,
    count: u32,
    groups: u32,
}

impl Chunk {
    /// Contents of the `@group(1) @binding(0)` range uniform.
    fn uniform(self) -> [u32; 4] {
        [self.offset, self.count, 0, 0]
    }
}

/// Cut `range` so no single dispatch exceeds `max_groups` work groups.
fn chunk_range(range: DispatchRange, max_groups: usize) -> Vec<Chunk> {
    let total_groups = range.global / range.local.max(1);
    let max_groups = max_groups.max(1);
    let mut chunks = Vec::new();
    let mut done = 0;
    while done < total_groups {
        let groups = (total_groups - done).min(max_groups);
        chunks.push(Chunk {
            offset: (range.offset + done * range.local) as u32,
            count: (groups * range.local) as u32,
            groups: groups as u32,
        });
        done += groups;
    }
    chunks
}

impl ComputeBackend for WgpuBackend {
    fn name(&self) -> String {
        self.adapter_name.clone()
    }

    fn build_program(&self, source: &str) -> Result<ProgramHandle> {
        let (module, error) = self.scoped(|| {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("epsilon_kernel"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });

        let info = pollster::block_on(module.get_compilation_info());
        let mut log: Vec<String> = info
            .messages
            .iter()
            .map(|m| match &m.location {
                Some(loc) => format!(
                    "{:?} at {}:{}: {}",
                    m.message_type, loc.line_number, loc.line_position, m.message
                ),
                None => format!("{:?}: {}", m.message_type, m.message),
            })
            .collect();
        let has_errors = info
            .messages
            .iter()
            .any(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error));

        if let Some(e) = error {
            log.push(e.to_string());
        } else if !has_errors {
            for line in &log {
                tracing::warn!("shader: {line}");
            }
            let mut state = self.state.lock();
            state.programs.push(module);
            return Ok(ProgramHandle(state.programs.len() as u32 - 1));
        }

        Err(Error::Build { log: log.join("\n") })
    }

    fn create_kernel(&self, program: ProgramHandle, entry: &str) -> Result<KernelHandle> {
        let mut state = self.state.lock();
        if program.0 as usize >= state.programs.len() {
            return Err(Error::Kernel {
                entry: entry.to_string(),
                reason: format!("unknown program {}", program.0),
            });
        }
        state.kernels.push(GpuKernel {
            entry: entry.to_string(),
            program: program.0 as usize,
            args: BTreeMap::new(),
            pipelines: HashMap::new(),
        });
        let handle = KernelHandle(state.kernels.len() as u32 - 1);

        // Validate the entry point now rather than on the first pass.
        let local = self.max_work_group_size(handle)?;
        self.ensure_pipeline(&mut state, handle, local)?;
        Ok(handle)
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>, contents: Option<&[u8]>) -> Result<BufferHandle> {
        if desc.size == 0 {
            return Err(Error::memory(desc.label, "zero-sized buffer"));
        }
        let usage = match desc.kind {
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            BufferKind::Storage => {
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC
            }
        };
        let padded = desc.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

        let (buffer, error) = self.scoped(|| match contents {
            Some(contents) => {
                let mut data = contents.to_vec();
                data.resize(padded as usize, 0);
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(desc.label),
                    contents: &data,
                    usage,
                })
            }
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size: padded,
                usage,
                mapped_at_creation: false,
            }),
        });
        if let Some(e) = error {
            return Err(Error::memory(desc.label, e.to_string()));
        }

        tracing::trace!(label = desc.label, size = desc.size, access = ?desc.access, "buffer allocated");
        let mut state = self.state.lock();
        state.buffers.push(Some(GpuBuffer {
            label: desc.label.to_string(),
            buffer,
            size: desc.size,
        }));
        Ok(BufferHandle(state.buffers.len() as u32 - 1))
    }

    fn create_image(&self, desc: &ImageDesc<'_>, texels: Option<&[u8]>) -> Result<ImageHandle> {
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let (texture, error) = self.scoped(|| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        });
        if let Some(e) = error {
            return Err(Error::memory(desc.label, e.to_string()));
        }

        if let Some(texels) = texels {
            if texels.len() != desc.byte_size() {
                return Err(Error::memory(desc.label, "texel data does not match image size"));
            }
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                texels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(desc.width * ImageDesc::TEXEL_SIZE as u32),
                    rows_per_image: Some(desc.height),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut state = self.state.lock();
        state.images.push(Some(GpuImage {
            _texture: texture,
            view,
        }));
        Ok(ImageHandle(state.images.len() as u32 - 1))
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let state = self.state.lock();
        let buf = state
            .buffers
            .get(buffer.0 as usize)
            .and_then(|b| b.as_ref())
            .ok_or_else(|| Error::transfer(format!("buffer#{}", buffer.0), "buffer not allocated"))?;
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(Error::transfer(&buf.label, "unaligned write"));
        }
        if offset + data.len() as u64 > buf.size {
            return Err(Error::transfer(&buf.label, "write past end of buffer"));
        }
        self.queue.write_buffer(&buf.buffer, offset, data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle, out: &mut [u8]) -> Result<()> {
        let state = self.state.lock();
        let buf = state
            .buffers
            .get(buffer.0 as usize)
            .and_then(|b| b.as_ref())
            .ok_or_else(|| Error::transfer(format!("buffer#{}", buffer.0), "buffer not allocated"))?;
        if out.len() as u64 != buf.size {
            return Err(Error::transfer(&buf.label, "read size does not match buffer size"));
        }

        let padded = buf.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size: padded,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
        encoder.copy_buffer_to_buffer(&buf.buffer, 0, &staging, 0, padded);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| Error::transfer(&buf.label, e.to_string()))?;
        rx.recv()
            .map_err(|e| Error::transfer(&buf.label, e.to_string()))?
            .map_err(|e| Error::transfer(&buf.label, e.to_string()))?;

        {
            let data = slice.get_mapped_range();
            out.copy_from_slice(&data[..out.len()]);
        }
        staging.unmap();
        Ok(())
    }

    fn set_arg(&self, kernel: KernelHandle, slot: u32, resource: Resource) -> Result<()> {
        let mut state = self.state.lock();
        let exists = match resource {
            Resource::Buffer(b) => matches!(state.buffers.get(b.0 as usize), Some(Some(_))),
            Resource::Image(i) => matches!(state.images.get(i.0 as usize), Some(Some(_))),
        };
        if !exists {
            return Err(Error::bind(slot, format!("{resource:?} is not allocated")));
        }
        let k = state
            .kernels
            .get_mut(kernel.0 as usize)
            .ok_or_else(|| Error::bind(slot, format!("unknown kernel {}", kernel.0)))?;
        k.args.insert(slot, resource);
        Ok(())
    }

    fn max_work_group_size(&self, _kernel: KernelHandle) -> Result<usize> {
        let limits = self.device.limits();
        let size = limits
            .max_compute_invocations_per_workgroup
            .min(limits.max_compute_workgroup_size_x);
        if size == 0 {
            return Err(Error::DeviceQuery("device reports no compute invocations".into()));
        }
        Ok(size as usize)
    }

    fn enqueue(&self, kernel: KernelHandle, range: DispatchRange) -> Result<()> {
        if range.local == 0 || range.global % range.local != 0 {
            return Err(Error::Device(format!(
                "global size {} is not a multiple of local size {}",
                range.global, range.local
            )));
        }

        let mut state = self.state.lock();
        self.ensure_pipeline(&mut state, kernel, range.local)?;

        let state = &*state;
        let k = &state.kernels[kernel.0 as usize];
        let pipeline = &k.pipelines[&range.local];

        let mut entries = Vec::with_capacity(k.args.len());
        for (&slot, resource) in &k.args {
            let resource = match *resource {
                Resource::Buffer(b) => state
                    .buffers
                    .get(b.0 as usize)
                    .and_then(|b| b.as_ref())
                    .map(|b| b.buffer.as_entire_binding()),
                Resource::Image(i) => state
                    .images
                    .get(i.0 as usize)
                    .and_then(|i| i.as_ref())
                    .map(|i| wgpu::BindingResource::TextureView(&i.view)),
            }
            .ok_or_else(|| Error::bind(slot, "resource released after binding"))?;
            entries.push(wgpu::BindGroupEntry { binding: slot, resource });
        }

        let max_groups = self.device.limits().max_compute_workgroups_per_dimension as usize;

        let ((), error) = self.scoped(|| {
            let args_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("kernel_args"),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &entries,
            });
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("dispatch") });

            for chunk in chunk_range(range, max_groups) {
                let params = chunk.uniform();
                let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("dispatch_range"),
                    contents: bytemuck::cast_slice(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                let range_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("dispatch_range"),
                    layout: &pipeline.get_bind_group_layout(1),
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    }],
                });

                {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("kernel_pass"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, &args_group, &[]);
                    pass.set_bind_group(1, &range_group, &[]);
                    pass.dispatch_workgroups(chunk.groups, 1, 1);
                }
            }
            self.queue.submit(Some(encoder.finish()));
        });

        match error {
            Some(e) => Err(Error::Device(e.to_string())),
            None => Ok(()),
        }
    }

    fn finish(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| Error::Device(e.to_string()))
    }

    fn release(&self, resource: Resource) {
        let mut state = self.state.lock();
        match resource {
            Resource::Buffer(b) => {
                if let Some(slot) = state.buffers.get_mut(b.0 as usize) {
                    if let Some(buf) = slot.take() {
                        buf.buffer.destroy();
                    }
                }
            }
            Resource::Image(i) => {
                if let Some(slot) = state.images.get_mut(i.0 as usize) {
                    *slot = None;
                }
            }
        }
    }
}
