//! Shared engine parameters.

use std::sync::Arc;

use crate::backend::{ComputeBackend, KernelHandle, ProgramHandle};
use crate::engine::RenderConfig;
use crate::scene::SceneSource;
use crate::util::{Error, Result};

/// Read-only state shared by the renderer and every kernel object.
///
/// Built once before any object and outlives all of them. Per-pass state is
/// never stored here; it reaches objects through `update(pass)`.
pub struct EngineParams {
    pub backend: Arc<dyn ComputeBackend>,
    pub program: ProgramHandle,
    pub kernel: KernelHandle,
    pub config: RenderConfig,
    pub scene: Box<dyn SceneSource>,
}

impl EngineParams {
    /// Compile `source` and create the configured entry point.
    ///
    /// A failed build logs the full compiler output before returning it.
    pub fn new(
        config: RenderConfig,
        backend: Arc<dyn ComputeBackend>,
        scene: Box<dyn SceneSource>,
        source: &str,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        tracing::info!(device = %backend.name(), "compiling render kernel");

        let program = backend.build_program(source).inspect_err(|e| {
            if let Error::Build { log } = e {
                tracing::error!("program build log:\n{log}");
            }
        })?;
        let kernel = backend.create_kernel(program, &config.entry_point)?;

        Ok(Arc::new(Self {
            backend,
            program,
            kernel,
            config,
            scene,
        }))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.config.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.config.height
    }

    #[inline]
    pub fn passes(&self) -> usize {
        self.config.passes
    }

    /// Number of work items per pass (one per pixel).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.config.width as usize * self.config.height as usize
    }
}
