//! Per-pass render parameters visible to the kernel.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::backend::{BufferDesc, BufferHandle};
use crate::kernel::{EngineParams, KernelObject, SlotCursor, Teardown};
use crate::util::Result;

/// Device layout of [`DeviceParams`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuParams {
    pub width: u32,
    pub height: u32,
    pub passes: u32,
    pub pass: u32,
}

/// Uniform block holding image size, pass budget and the current pass.
pub struct DeviceParams {
    params: Arc<EngineParams>,
    buffer: BufferHandle,
    data: GpuParams,
}

impl DeviceParams {
    pub const NAME: &'static str = "DeviceParams";

    pub fn new(params: &Arc<EngineParams>) -> Result<Self> {
        tracing::debug!("initializing <{}>", Self::NAME);
        let data = GpuParams {
            width: params.width(),
            height: params.height(),
            passes: params.passes() as u32,
            pass: 0,
        };
        let buffer = params.backend.create_buffer(
            &BufferDesc::uniform("params", std::mem::size_of::<GpuParams>() as u64),
            Some(bytemuck::bytes_of(&data)),
        )?;
        Ok(Self {
            params: Arc::clone(params),
            buffer,
            data,
        })
    }
}

impl KernelObject for DeviceParams {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bind(&mut self, cursor: &mut SlotCursor<'_>) -> Result<()> {
        cursor.bind(Self::NAME, "params", self.buffer)?;
        Ok(())
    }

    fn update(&mut self, pass: usize) -> Result<()> {
        self.data.pass = pass as u32;
        self.params
            .backend
            .write_buffer(self.buffer, 0, bytemuck::bytes_of(&self.data))
    }

    fn teardown(&mut self, _mode: Teardown) -> Result<()> {
        self.params.backend.release(self.buffer.into());
        Ok(())
    }
}
