//! Model-to-material mapping.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::backend::{Access, BufferDesc, BufferHandle};
use crate::kernel::{EngineParams, KernelObject, SlotCursor, Teardown};
use crate::scene::ids;
use crate::util::Result;

/// `materials.json` contents.
#[derive(Debug, Clone, Deserialize)]
pub struct MaterialsFile {
    /// Material of the medium surrounding the scene.
    pub atmosphere: u32,
    /// Material per model name.
    #[serde(default)]
    pub models: BTreeMap<String, u32>,
}

/// Lookup table from material index to material id.
///
/// Index 0 is the atmosphere; models follow in ascending name order.
pub struct Materials {
    params: Arc<EngineParams>,
    buffer: BufferHandle,
    mapping: Vec<u32>,
}

impl Materials {
    pub const NAME: &'static str = "Materials";

    pub fn new(params: &Arc<EngineParams>) -> Result<Self> {
        tracing::debug!("initializing <{}>", Self::NAME);
        let data = params.scene.read_all(ids::MATERIALS)?;
        let file: MaterialsFile = serde_json::from_slice(&data)?;
        Self::from_file(params, file)
    }

    pub fn from_file(params: &Arc<EngineParams>, file: MaterialsFile) -> Result<Self> {
        let mut mapping = Vec::with_capacity(file.models.len() + 1);
        mapping.push(file.atmosphere);
        mapping.extend(file.models.into_values());
        tracing::debug!(models = mapping.len() - 1, "material mapping loaded");

        let bytes: &[u8] = bytemuck::cast_slice(&mapping);
        let buffer = params.backend.create_buffer(
            &BufferDesc::storage("mapping", bytes.len() as u64, Access::ReadOnly),
            Some(bytes),
        )?;
        Ok(Self {
            params: Arc::clone(params),
            buffer,
            mapping,
        })
    }

    pub fn mapping(&self) -> &[u32] {
        &self.mapping
    }
}

impl KernelObject for Materials {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bind(&mut self, cursor: &mut SlotCursor<'_>) -> Result<()> {
        cursor.bind(Self::NAME, "mapping", self.buffer)?;
        Ok(())
    }

    fn teardown(&mut self, _mode: Teardown) -> Result<()> {
        self.params.backend.release(self.buffer.into());
        Ok(())
    }
}
