//! Per-pass random seed.

use std::sync::Arc;

use crate::backend::{Access, BufferDesc, BufferHandle};
use crate::kernel::{EngineParams, KernelObject, SlotCursor, Teardown};
use crate::util::Result;

/// Size of the device seed block (four 64-bit words).
pub const SEED_BLOCK_SIZE: u64 = 32;

/// Seed block the kernel derives its random streams from.
///
/// Every pass sees a distinct seed: `update` uploads the current seed and
/// then advances it, so the dispatch that follows reads the fresh value.
pub struct Prng {
    params: Arc<EngineParams>,
    buffer: BufferHandle,
    seed: u64,
}

impl Prng {
    pub const NAME: &'static str = "PRNG";

    pub fn new(params: &Arc<EngineParams>) -> Result<Self> {
        tracing::debug!("initializing <{}>", Self::NAME);
        let buffer = params.backend.create_buffer(
            &BufferDesc::storage("seed", SEED_BLOCK_SIZE, Access::ReadOnly),
            None,
        )?;
        Ok(Self {
            params: Arc::clone(params),
            buffer,
            seed: params.config.seed,
        })
    }

    /// Seed the next pass will receive.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }
}

impl KernelObject for Prng {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bind(&mut self, cursor: &mut SlotCursor<'_>) -> Result<()> {
        cursor.bind(Self::NAME, "seed", self.buffer)?;
        Ok(())
    }

    fn update(&mut self, _pass: usize) -> Result<()> {
        self.params
            .backend
            .write_buffer(self.buffer, 0, &self.seed.to_le_bytes())?;
        self.seed = self.seed.wrapping_add(1);
        Ok(())
    }

    fn teardown(&mut self, _mode: Teardown) -> Result<()> {
        self.params.backend.release(self.buffer.into());
        Ok(())
    }
}
