//! Compute backend abstraction.
//!
//! Everything above this module (BVH upload, kernel objects, the renderer)
//! talks to the device only through [`ComputeBackend`]. Device resources are
//! addressed by small integer handles owned by the backend, never by pointer.
//!
//! Two implementations ship with the crate:
//! - [`HostBackend`] - in-memory software device running Rust closures
//! - `WgpuBackend` - WGSL compute on any wgpu adapter (feature `gpu`)

mod host;
#[cfg(feature = "gpu")]
mod wgpu;

pub use host::{HostBackend, HostKernel, KernelArgs};
#[cfg(feature = "gpu")]
pub use self::wgpu::WgpuBackend;

use crate::util::Result;

/// Handle to a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u32);

/// Handle to a device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageHandle(pub(crate) u32);

/// Handle to a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u32);

/// Handle to a kernel entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub(crate) u32);

/// A bindable device resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Buffer(BufferHandle),
    Image(ImageHandle),
}

impl From<BufferHandle> for Resource {
    fn from(b: BufferHandle) -> Self {
        Resource::Buffer(b)
    }
}

impl From<ImageHandle> for Resource {
    fn from(i: ImageHandle) -> Self {
        Resource::Image(i)
    }
}

/// Kernel-side access to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// How a buffer is presented to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Small constant block.
    Uniform,
    /// Arbitrary-size array.
    Storage,
}

/// Buffer allocation request.
#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub access: Access,
    pub kind: BufferKind,
}

impl<'a> BufferDesc<'a> {
    pub fn storage(label: &'a str, size: u64, access: Access) -> Self {
        Self {
            label,
            size,
            access,
            kind: BufferKind::Storage,
        }
    }

    pub fn uniform(label: &'a str, size: u64) -> Self {
        Self {
            label,
            size,
            access: Access::ReadOnly,
            kind: BufferKind::Uniform,
        }
    }
}

/// Read-only 2D image of RGBA f32 texels.
#[derive(Debug, Clone)]
pub struct ImageDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
}

impl ImageDesc<'_> {
    /// Bytes per RGBA f32 texel.
    pub const TEXEL_SIZE: usize = 16;

    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * Self::TEXEL_SIZE
    }
}

/// One 1D sub-dispatch: `global` work items starting at `offset`, in groups
/// of `local`. `global` is always a multiple of `local`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRange {
    pub offset: usize,
    pub global: usize,
    pub local: usize,
}

impl DispatchRange {
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.global
    }
}

/// Minimal device surface the renderer depends on.
///
/// Methods take `&self`; implementations synchronize internally so a single
/// backend can be shared by every kernel object.
pub trait ComputeBackend {
    /// Human-readable device name, for logs.
    fn name(&self) -> String;

    /// Compile program source. Failure carries the compiler log.
    fn build_program(&self, source: &str) -> Result<ProgramHandle>;

    /// Create an entry point from a built program.
    fn create_kernel(&self, program: ProgramHandle, entry: &str) -> Result<KernelHandle>;

    /// Allocate a buffer, optionally initialized from `contents`
    /// (zero-filled otherwise).
    fn create_buffer(&self, desc: &BufferDesc<'_>, contents: Option<&[u8]>) -> Result<BufferHandle>;

    /// Allocate a read-only image, optionally initialized from RGBA f32 texels.
    fn create_image(&self, desc: &ImageDesc<'_>, texels: Option<&[u8]>) -> Result<ImageHandle>;

    /// Write host data into a buffer. Ordered before any later dispatch.
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    /// Blocking read of a whole buffer. Waits for all queued work first.
    fn read_buffer(&self, buffer: BufferHandle, out: &mut [u8]) -> Result<()>;

    /// Bind a resource to a positional argument slot of a kernel.
    fn set_arg(&self, kernel: KernelHandle, slot: u32, resource: Resource) -> Result<()>;

    /// Largest work-group size usable with `kernel`.
    fn max_work_group_size(&self, kernel: KernelHandle) -> Result<usize>;

    /// Queue one sub-dispatch. May return before the work runs.
    fn enqueue(&self, kernel: KernelHandle, range: DispatchRange) -> Result<()>;

    /// Block until all queued work has completed.
    fn finish(&self) -> Result<()>;

    /// Free a device resource. Unknown handles are ignored.
    fn release(&self, resource: Resource);
}
