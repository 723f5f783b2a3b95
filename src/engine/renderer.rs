//! Render orchestrator.

use std::sync::Arc;

use crate::backend::ComputeBackend;
use crate::kernel::{
    teardown_all, EngineParams, KernelObject, Query, QueryValue, SlotBinding, SlotCursor, Teardown,
};
use crate::objects::default_objects;
use crate::scene::DirectorySource;
use crate::util::{Error, Result};

use super::config::RenderConfig;
use super::dispatch::split_dispatch;
use super::stats::Statistics;

/// Drives a fixed number of passes of one compute kernel over the image.
///
/// Owns the engine parameters and an ordered list of kernel objects. Objects
/// are bound once, in order, at construction; every pass updates them in the
/// same order, dispatches one work item per pixel and waits for the device.
///
/// A renderer that is dropped before [`finish`](Self::finish) releases its
/// objects without writing any output.
pub struct Renderer {
    params: Arc<EngineParams>,
    objects: Vec<Box<dyn KernelObject>>,
    bindings: Vec<SlotBinding>,
    pass: usize,
}

impl Renderer {
    /// Compile the configured kernel and build the standard object list
    /// from the scene directory.
    #[tracing::instrument(skip_all, fields(width = config.width, height = config.height, passes = config.passes))]
    pub fn new(config: RenderConfig, backend: Arc<dyn ComputeBackend>) -> Result<Self> {
        config.validate()?;
        let source = std::fs::read_to_string(&config.kernel)
            .map_err(|e| Error::Program(format!("{}: {e}", config.kernel.display())))?;
        let scene = Box::new(DirectorySource::new(&config.scene));

        let params = EngineParams::new(config, backend, scene, &source)?;
        let objects = default_objects(&params)?;
        Self::with_objects(params, objects)
    }

    /// Bind a caller-supplied object list, in order.
    ///
    /// On a bind failure every object is released before returning.
    pub fn with_objects(
        params: Arc<EngineParams>,
        mut objects: Vec<Box<dyn KernelObject>>,
    ) -> Result<Self> {
        let mut cursor = SlotCursor::new(params.backend.as_ref(), params.kernel);
        for object in objects.iter_mut() {
            if let Err(e) = object.bind(&mut cursor) {
                tracing::error!(object = object.name(), "bind failed: {e}");
                let _ = teardown_all(&mut objects, Teardown::Abort);
                return Err(e);
            }
        }
        tracing::info!(
            objects = objects.len(),
            slots = cursor.position(),
            "kernel objects bound"
        );
        let bindings = cursor.into_bindings();

        Ok(Self {
            params,
            objects,
            bindings,
            pass: 0,
        })
    }

    pub fn params(&self) -> &Arc<EngineParams> {
        &self.params
    }

    /// Argument slots in binding order.
    pub fn bindings(&self) -> &[SlotBinding] {
        &self.bindings
    }

    /// Passes completed so far.
    pub fn pass(&self) -> usize {
        self.pass
    }

    pub fn is_finished(&self) -> bool {
        self.pass >= self.params.passes()
    }

    /// Run one pass. Returns `true` once every pass has completed; further
    /// calls do nothing and keep returning `true`.
    #[tracing::instrument(skip(self), fields(pass = self.pass))]
    pub fn execute(&mut self) -> Result<bool> {
        if self.is_finished() {
            return Ok(true);
        }
        let pass = self.pass;

        for object in self.objects.iter_mut() {
            object.update(pass)?;
        }

        let backend = &self.params.backend;
        let kernel = self.params.kernel;
        let dispatch_error = |e: Error| match e {
            Error::Device(reason) => Error::Dispatch { pass, reason },
            other => other,
        };

        let local = backend.max_work_group_size(kernel)?;
        for range in split_dispatch(self.params.pixel_count(), local) {
            tracing::trace!(offset = range.offset, global = range.global, local = range.local, "dispatch");
            backend.enqueue(kernel, range).map_err(dispatch_error)?;
        }
        backend.finish().map_err(dispatch_error)?;

        self.pass += 1;
        Ok(self.is_finished())
    }

    /// First answer to `query` among the objects, in registration order.
    pub fn query(&self, query: Query) -> Option<QueryValue> {
        self.objects.iter().find_map(|o| o.query(query))
    }

    /// Snapshot of the render's telemetry.
    pub fn statistics(&self) -> Statistics {
        let progress = self
            .query(Query::Progress)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let elapsed_seconds = self
            .query(Query::ElapsedTime)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let remaining_seconds = self.query(Query::EstimatedTime).and_then(|v| v.as_f64());
        let triangle_count = self
            .query(Query::TriangleCount)
            .and_then(|v| v.as_count())
            .unwrap_or(0);

        Statistics {
            progress,
            elapsed_seconds,
            remaining_seconds,
            triangle_count,
        }
    }

    /// Tear down every object after the last pass, writing the output.
    ///
    /// Finishing early releases everything without writing the image and
    /// reports how far the render got.
    pub fn finish(mut self) -> Result<()> {
        let mut objects = std::mem::take(&mut self.objects);
        if !self.is_finished() {
            let _ = teardown_all(&mut objects, Teardown::Abort);
            return Err(Error::Incomplete {
                completed: self.pass,
                passes: self.params.passes(),
            });
        }
        tracing::info!(passes = self.pass, "render complete");
        teardown_all(&mut objects, Teardown::Complete)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if !self.objects.is_empty() {
            tracing::debug!(pass = self.pass, "renderer dropped before finish");
            let _ = teardown_all(&mut self.objects, Teardown::Abort);
        }
    }
}
