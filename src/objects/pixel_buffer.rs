//! Accumulation buffer and final image output.

use std::sync::Arc;

use crate::backend::{Access, BufferDesc, BufferHandle};
use crate::kernel::{EngineParams, KernelObject, SlotCursor, Teardown};
use crate::util::Result;

use super::output;

/// Read-write RGBA f32 buffer, one texel per pixel.
///
/// The kernel accumulates weighted colour into it across passes; only the
/// state after the last pass is meaningful, so the image is read back and
/// written when the render completes, never earlier.
pub struct PixelBuffer {
    params: Arc<EngineParams>,
    buffer: BufferHandle,
}

impl PixelBuffer {
    pub const NAME: &'static str = "PixelBuffer";

    pub fn new(params: &Arc<EngineParams>) -> Result<Self> {
        tracing::debug!("initializing <{}>", Self::NAME);
        let size = params.pixel_count() as u64 * 16;
        let buffer = params.backend.create_buffer(
            &BufferDesc::storage("pixels", size, Access::ReadWrite),
            None,
        )?;
        Ok(Self {
            params: Arc::clone(params),
            buffer,
        })
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    fn flush(&self) -> Result<()> {
        let mut bytes = vec![0u8; self.params.pixel_count() * 16];
        self.params.backend.read_buffer(self.buffer, &mut bytes)?;
        let accum: Vec<[f32; 4]> = bytemuck::pod_collect_to_vec(&bytes);
        let pixels = output::resolve(&accum);

        let config = &self.params.config;
        output::write_image(
            &config.output,
            config.width,
            config.height,
            &pixels,
            config.tonemap_exposure,
        )
    }
}

impl KernelObject for PixelBuffer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bind(&mut self, cursor: &mut SlotCursor<'_>) -> Result<()> {
        cursor.bind(Self::NAME, "pixels", self.buffer)?;
        Ok(())
    }

    fn teardown(&mut self, mode: Teardown) -> Result<()> {
        let result = match mode {
            Teardown::Complete => self.flush(),
            Teardown::Abort => {
                tracing::warn!("render incomplete, no image written");
                Ok(())
            }
        };
        self.params.backend.release(self.buffer.into());
        result
    }
}
