//! Kernel object protocol.
//!
//! A kernel object owns zero or more device resources and takes part in a
//! fixed lifecycle driven by the renderer:
//!
//! ```text
//! constructed -> bound -> (updated -> dispatched)* -> torn down
//! ```
//!
//! Objects bind in registration order through a shared [`SlotCursor`], so the
//! positional argument list of the device kernel is the concatenation of
//! every object's slots. Queries use one collision-free namespace ([`Query`]);
//! the renderer asks each object in turn and takes the first answer.

mod params;

pub use params::EngineParams;

use crate::backend::{ComputeBackend, KernelHandle, Resource};
use crate::util::Result;

/// Telemetry a kernel object may answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    /// Fraction of passes completed, in `[0, 1]`.
    Progress,
    /// Number of triangles loaded.
    TriangleCount,
    /// Remaining seconds.
    EstimatedTime,
    /// Seconds since the render started.
    ElapsedTime,
}

/// Answer to a [`Query`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryValue {
    Fraction(f64),
    Count(u64),
    Seconds(f64),
    /// Recognized, but no meaningful value yet.
    Indeterminate,
}

impl QueryValue {
    /// Numeric value, if determinate.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            QueryValue::Fraction(v) | QueryValue::Seconds(v) => Some(v),
            QueryValue::Count(n) => Some(n as f64),
            QueryValue::Indeterminate => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match *self {
            QueryValue::Count(n) => Some(n),
            _ => None,
        }
    }
}

/// How a kernel object is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Every pass completed and was synchronized; final output may be written.
    Complete,
    /// Render failed or was abandoned; release resources only.
    Abort,
}

/// A device-resident component composed into the render kernel.
pub trait KernelObject {
    /// Short name used in logs (`Geometry`, `Camera`, ...).
    fn name(&self) -> &'static str;

    /// Attach device resources starting at the cursor's current slot.
    fn bind(&mut self, cursor: &mut SlotCursor<'_>) -> Result<()>;

    /// Per-pass synchronization, called before the pass is dispatched.
    fn update(&mut self, _pass: usize) -> Result<()> {
        Ok(())
    }

    /// Answer a query, or `None` if this object does not recognize it.
    fn query(&self, _query: Query) -> Option<QueryValue> {
        None
    }

    /// Release device resources. Called exactly once.
    fn teardown(&mut self, mode: Teardown) -> Result<()>;
}

/// One recorded argument binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotBinding {
    pub slot: u32,
    pub owner: &'static str,
    pub label: &'static str,
    pub resource: Resource,
}

/// Next free argument slot of the render kernel.
pub struct SlotCursor<'a> {
    backend: &'a dyn ComputeBackend,
    kernel: KernelHandle,
    next: u32,
    bindings: Vec<SlotBinding>,
}

impl<'a> SlotCursor<'a> {
    pub fn new(backend: &'a dyn ComputeBackend, kernel: KernelHandle) -> Self {
        Self {
            backend,
            kernel,
            next: 0,
            bindings: Vec::new(),
        }
    }

    /// Bind `resource` to the next slot and advance. Returns the slot used.
    pub fn bind(
        &mut self,
        owner: &'static str,
        label: &'static str,
        resource: impl Into<Resource>,
    ) -> Result<u32> {
        let resource = resource.into();
        let slot = self.next;
        tracing::debug!("binding <{label}@{owner}> to slot {slot}");
        self.backend.set_arg(self.kernel, slot, resource)?;
        self.bindings.push(SlotBinding {
            slot,
            owner,
            label,
            resource,
        });
        self.next += 1;
        Ok(slot)
    }

    /// Index of the next slot to be bound; equals the slots consumed so far.
    pub fn position(&self) -> u32 {
        self.next
    }

    pub fn bindings(&self) -> &[SlotBinding] {
        &self.bindings
    }

    pub fn into_bindings(self) -> Vec<SlotBinding> {
        self.bindings
    }
}

/// Tear down `objects` in order, returning the first error after every
/// object has had its turn.
pub fn teardown_all(objects: &mut [Box<dyn KernelObject>], mode: Teardown) -> Result<()> {
    let mut first_error = None;
    for object in objects.iter_mut() {
        if let Err(e) = object.teardown(mode) {
            tracing::error!(object = object.name(), "teardown failed: {e}");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
