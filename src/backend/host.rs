//! Software compute backend.
//!
//! Buffers and images live in host memory. Kernels are Rust closures
//! registered by entry-point name and invoked once per work item. Queued
//! dispatches run in order on `finish` (or before any transfer), which gives
//! the same ordering guarantees as an in-order device queue.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    Access, BufferDesc, BufferHandle, ComputeBackend, DispatchRange, ImageDesc, ImageHandle,
    KernelHandle, ProgramHandle, Resource,
};
use crate::util::{Error, Result};

/// Host kernel: called with the bound arguments and the global work-item id.
pub type HostKernel = Arc<dyn Fn(&mut KernelArgs<'_>, usize) + Send + Sync>;

const DEFAULT_MAX_WORK_GROUP: usize = 256;

struct HostBuffer {
    label: String,
    access: Access,
    data: Vec<u8>,
}

struct HostImage {
    width: u32,
    height: u32,
    texels: Vec<u8>,
}

struct KernelState {
    entry: String,
    func: HostKernel,
    args: BTreeMap<u32, Resource>,
}

#[derive(Default)]
struct HostState {
    buffers: Vec<Option<HostBuffer>>,
    images: Vec<Option<HostImage>>,
    programs: Vec<String>,
    kernels: Vec<KernelState>,
    pending: Vec<(KernelHandle, DispatchRange)>,
    dispatched: Vec<DispatchRange>,
    fail_next: Option<String>,
}

/// In-memory compute device.
pub struct HostBackend {
    registry: Mutex<HashMap<String, HostKernel>>,
    state: Mutex<HostState>,
    max_work_group: usize,
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBackend {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            state: Mutex::new(HostState::default()),
            max_work_group: DEFAULT_MAX_WORK_GROUP,
        }
    }

    /// Set the maximum work-group size reported to the renderer.
    pub fn with_max_work_group(mut self, size: usize) -> Self {
        self.max_work_group = size;
        self
    }

    /// Register a kernel closure under an entry-point name.
    pub fn with_kernel<F>(self, entry: &str, func: F) -> Self
    where
        F: Fn(&mut KernelArgs<'_>, usize) + Send + Sync + 'static,
    {
        self.registry.lock().insert(entry.to_string(), Arc::new(func));
        self
    }

    /// Every sub-dispatch executed so far, in order.
    pub fn dispatches(&self) -> Vec<DispatchRange> {
        self.state.lock().dispatched.clone()
    }

    /// Current argument bindings of a kernel, by slot.
    pub fn bindings(&self, kernel: KernelHandle) -> Vec<(u32, Resource)> {
        let state = self.state.lock();
        state
            .kernels
            .get(kernel.0 as usize)
            .map(|k| k.args.iter().map(|(&s, &r)| (s, r)).collect())
            .unwrap_or_default()
    }

    /// Snapshot of a buffer's contents (`None` once released).
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state
            .buffers
            .get(buffer.0 as usize)
            .and_then(|b| b.as_ref())
            .map(|b| b.data.clone())
    }

    /// Number of buffers and images still allocated.
    pub fn live_resources(&self) -> usize {
        let state = self.state.lock();
        state.buffers.iter().flatten().count() + state.images.iter().flatten().count()
    }

    /// Make the next `finish` report a device failure.
    pub fn fail_next_finish(&self, reason: impl Into<String>) {
        self.state.lock().fail_next = Some(reason.into());
    }

    fn drain(state: &mut HostState) -> Result<()> {
        let pending = std::mem::take(&mut state.pending);
        for (kernel, range) in pending {
            let (func, args) = {
                let k = state
                    .kernels
                    .get(kernel.0 as usize)
                    .ok_or_else(|| Error::Device(format!("unknown kernel {}", kernel.0)))?;
                (k.func.clone(), k.args.clone())
            };

            let mut kargs = KernelArgs {
                args: &args,
                buffers: &mut state.buffers,
                images: &state.images,
            };
            for id in range.offset..range.end() {
                func(&mut kargs, id);
            }
            state.dispatched.push(range);
        }
        Ok(())
    }

    fn buffer_mut(state: &mut HostState, buffer: BufferHandle) -> Result<&mut HostBuffer> {
        state
            .buffers
            .get_mut(buffer.0 as usize)
            .and_then(|b| b.as_mut())
            .ok_or_else(|| Error::transfer(format!("buffer#{}", buffer.0), "buffer not allocated"))
    }
}

impl ComputeBackend for HostBackend {
    fn name(&self) -> String {
        "host".to_string()
    }

    fn build_program(&self, source: &str) -> Result<ProgramHandle> {
        if source.trim().is_empty() {
            return Err(Error::Build {
                log: "empty program source".to_string(),
            });
        }

        // `#error` lines fail the build the way a preprocessor would.
        let log: Vec<&str> = source
            .lines()
            .filter(|l| l.trim_start().starts_with("#error"))
            .collect();
        if !log.is_empty() {
            return Err(Error::Build { log: log.join("\n") });
        }

        let mut state = self.state.lock();
        state.programs.push(source.to_string());
        Ok(ProgramHandle(state.programs.len() as u32 - 1))
    }

    fn create_kernel(&self, program: ProgramHandle, entry: &str) -> Result<KernelHandle> {
        let func = self.registry.lock().get(entry).cloned().ok_or_else(|| Error::Kernel {
            entry: entry.to_string(),
            reason: "no such entry point".to_string(),
        })?;

        let mut state = self.state.lock();
        if program.0 as usize >= state.programs.len() {
            return Err(Error::Kernel {
                entry: entry.to_string(),
                reason: format!("unknown program {}", program.0),
            });
        }
        state.kernels.push(KernelState {
            entry: entry.to_string(),
            func,
            args: BTreeMap::new(),
        });
        Ok(KernelHandle(state.kernels.len() as u32 - 1))
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>, contents: Option<&[u8]>) -> Result<BufferHandle> {
        if desc.size == 0 {
            return Err(Error::memory(desc.label, "zero-sized buffer"));
        }
        let mut data = vec![0u8; desc.size as usize];
        if let Some(contents) = contents {
            if contents.len() as u64 > desc.size {
                return Err(Error::memory(desc.label, "initial contents exceed buffer size"));
            }
            data[..contents.len()].copy_from_slice(contents);
        }

        let mut state = self.state.lock();
        state.buffers.push(Some(HostBuffer {
            label: desc.label.to_string(),
            access: desc.access,
            data,
        }));
        Ok(BufferHandle(state.buffers.len() as u32 - 1))
    }

    fn create_image(&self, desc: &ImageDesc<'_>, texels: Option<&[u8]>) -> Result<ImageHandle> {
        let size = desc.byte_size();
        if size == 0 {
            return Err(Error::memory(desc.label, "zero-sized image"));
        }
        let texels = match texels {
            Some(t) if t.len() == size => t.to_vec(),
            Some(t) => {
                return Err(Error::memory(
                    desc.label,
                    format!("expected {size} bytes of texels, got {}", t.len()),
                ))
            }
            None => vec![0u8; size],
        };

        let mut state = self.state.lock();
        state.images.push(Some(HostImage {
            width: desc.width,
            height: desc.height,
            texels,
        }));
        Ok(ImageHandle(state.images.len() as u32 - 1))
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        Self::drain(&mut state)?;
        let buf = Self::buffer_mut(&mut state, buffer)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > buf.data.len() {
            return Err(Error::transfer(&buf.label, "write past end of buffer"));
        }
        buf.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle, out: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock();
        Self::drain(&mut state)?;
        let buf = Self::buffer_mut(&mut state, buffer)?;
        if out.len() != buf.data.len() {
            return Err(Error::transfer(
                &buf.label,
                format!("read of {} bytes from a {} byte buffer", out.len(), buf.data.len()),
            ));
        }
        out.copy_from_slice(&buf.data);
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
        tracing::trace!(entry = %k.entry, slot, ?resource, "set_arg");
        k.args.insert(slot, resource);
        Ok(())
    }

    fn max_work_group_size(&self, kernel: KernelHandle) -> Result<usize> {
        let state = self.state.lock();
        if kernel.0 as usize >= state.kernels.len() {
            return Err(Error::DeviceQuery(format!("unknown kernel {}", kernel.0)));
        }
        Ok(self.max_work_group)
    }

    fn enqueue(&self, kernel: KernelHandle, range: DispatchRange) -> Result<()> {
        if range.local == 0 || range.local > self.max_work_group {
            return Err(Error::Device(format!("invalid local size {}", range.local)));
        }
        if range.global % range.local != 0 {
            return Err(Error::Device(format!(
                "global size {} is not a multiple of local size {}",
                range.global, range.local
            )));
        }
        let mut state = self.state.lock();
        if kernel.0 as usize >= state.kernels.len() {
            return Err(Error::Device(format!("unknown kernel {}", kernel.0)));
        }
        state.pending.push((kernel, range));
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_next.take() {
            state.pending.clear();
            return Err(Error::Device(reason));
        }
        Self::drain(&mut state)
    }

    fn release(&self, resource: Resource) {
        let mut state = self.state.lock();
        match resource {
            Resource::Buffer(b) => {
                if let Some(slot) = state.buffers.get_mut(b.0 as usize) {
                    *slot = None;
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

/// Arguments visible to a host kernel invocation, addressed by slot.
pub struct KernelArgs<'a> {
    args: &'a BTreeMap<u32, Resource>,
    buffers: &'a mut [Option<HostBuffer>],
    images: &'a [Option<HostImage>],
}

impl KernelArgs<'_> {
    /// Bytes of the buffer bound at `slot`.
    pub fn buffer(&self, slot: u32) -> Option<&[u8]> {
        match self.args.get(&slot)? {
            Resource::Buffer(b) => self.buffers.get(b.0 as usize)?.as_ref().map(|b| b.data.as_slice()),
            Resource::Image(_) => None,
        }
    }

    /// Mutable bytes of the read-write buffer bound at `slot`.
    pub fn buffer_mut(&mut self, slot: u32) -> Option<&mut [u8]> {
        match self.args.get(&slot)? {
            Resource::Buffer(b) => self
                .buffers
                .get_mut(b.0 as usize)?
                .as_mut()
                .filter(|b| b.access == Access::ReadWrite)
                .map(|b| b.data.as_mut_slice()),
            Resource::Image(_) => None,
        }
    }

    /// Read a plain value from the start of the buffer at `slot`.
    pub fn read<T: bytemuck::Pod>(&self, slot: u32) -> Option<T> {
        let bytes = self.buffer(slot)?;
        let size = std::mem::size_of::<T>();
        (bytes.len() >= size).then(|| bytemuck::pod_read_unaligned(&bytes[..size]))
    }

    /// Texels and dimensions of the image bound at `slot`.
    pub fn image(&self, slot: u32) -> Option<(&[u8], u32, u32)> {
        match self.args.get(&slot)? {
            Resource::Image(i) => self
                .images
                .get(i.0 as usize)?
                .as_ref()
                .map(|img| (img.texels.as_slice(), img.width, img.height)),
            Resource::Buffer(_) => None,
        }
    }

    /// Number of bound slots.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}
