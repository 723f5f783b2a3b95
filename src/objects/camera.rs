//! Pinhole camera.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use serde::Deserialize;

use crate::backend::{BufferDesc, BufferHandle};
use crate::kernel::{EngineParams, KernelObject, SlotCursor, Teardown};
use crate::scene::ids;
use crate::util::{basis, transform, Error, Result, Vec3};

/// `camera.json` contents.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraFile {
    pub position: [f32; 3],
    pub target: [f32; 3],
    /// Full field of view, degrees.
    pub field_of_view: f32,
}

/// Device layout: focal plane corners (top-left, top-right, bottom-right,
/// bottom-left) and the eye position.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuCamera {
    pub corners: [[f32; 4]; 4],
    pub position: [f32; 4],
}

impl GpuCamera {
    pub fn from_file(file: &CameraFile) -> Result<Self> {
        let position = Vec3::from(file.position);
        let target = Vec3::from(file.target);
        let dir = (target - position).normalize_or_zero();
        if dir == Vec3::ZERO {
            return Err(Error::invalid_scene("camera target equals camera position"));
        }
        if !(file.field_of_view > 0.0 && file.field_of_view < 180.0) {
            return Err(Error::invalid_scene(format!(
                "field of view {} is outside (0, 180)",
                file.field_of_view
            )));
        }
        if dir.cross(Vec3::Y).length_squared() < 1e-12 {
            return Err(Error::invalid_scene("camera looks straight along the up axis"));
        }

        let (normal, tangent) = basis(dir);
        let z = 1.0 / (file.field_of_view.to_radians() * 0.5).tan();
        let plane = [
            Vec3::new(-1.0, 1.0, z),
            Vec3::new(1.0, 1.0, z),
            Vec3::new(1.0, -1.0, z),
            Vec3::new(-1.0, -1.0, z),
        ];

        let corners = plane.map(|c| (transform(c, tangent, normal, dir) + position).extend(0.0).to_array());
        Ok(Self {
            corners,
            position: position.extend(0.0).to_array(),
        })
    }
}

/// Camera block loaded from `camera.json`. Static across passes.
pub struct Camera {
    params: Arc<EngineParams>,
    buffer: BufferHandle,
    data: GpuCamera,
}

impl Camera {
    pub const NAME: &'static str = "Camera";

    pub fn new(params: &Arc<EngineParams>) -> Result<Self> {
        tracing::debug!("initializing <{}>", Self::NAME);
        let bytes = params.scene.read_all(ids::CAMERA)?;
        let file: CameraFile = serde_json::from_slice(&bytes)?;
        tracing::debug!(position = ?file.position, target = ?file.target, fov = file.field_of_view, "camera loaded");

        let data = GpuCamera::from_file(&file)?;
        let buffer = params.backend.create_buffer(
            &BufferDesc::uniform("camera", std::mem::size_of::<GpuCamera>() as u64),
            Some(bytemuck::bytes_of(&data)),
        )?;
        Ok(Self {
            params: Arc::clone(params),
            buffer,
            data,
        })
    }

    pub fn data(&self) -> &GpuCamera {
        &self.data
    }
}

impl KernelObject for Camera {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bind(&mut self, cursor: &mut SlotCursor<'_>) -> Result<()> {
        cursor.bind(Self::NAME, "camera", self.buffer)?;
        Ok(())
    }

    fn teardown(&mut self, _mode: Teardown) -> Result<()> {
        self.params.backend.release(self.buffer.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(fov: f32) -> CameraFile {
        CameraFile {
            position: [0.0, 0.0, -10.0],
            target: [0.0, 0.0, 0.0],
            field_of_view: fov,
        }
    }

    #[test]
    fn test_focal_plane_ninety_degrees() {
        let cam = GpuCamera::from_file(&file(90.0)).unwrap();
        assert_eq!(cam.position, [0.0, 0.0, -10.0, 0.0]);
        // fov 90 puts the plane at distance 1, corners at unit offsets.
        for corner in &cam.corners {
            let c = Vec3::new(corner[0], corner[1], corner[2]);
            assert!((c.z - -9.0).abs() < 1e-5);
            assert!((c.x.abs() - 1.0).abs() < 1e-5);
            assert!((c.y.abs() - 1.0).abs() < 1e-5);
        }
        // Top corners above bottom corners.
        assert!(cam.corners[0][1] > 0.0 && cam.corners[3][1] < 0.0);
    }

    #[test]
    fn test_rejects_degenerate_cameras() {
        assert!(GpuCamera::from_file(&file(0.0)).is_err());
        assert!(GpuCamera::from_file(&file(180.0)).is_err());

        let same = CameraFile {
            position: [1.0; 3],
            target: [1.0; 3],
            field_of_view: 45.0,
        };
        assert!(matches!(GpuCamera::from_file(&same), Err(Error::InvalidScene(_))));

        let up = CameraFile {
            position: [0.0; 3],
            target: [0.0, 5.0, 0.0],
            field_of_view: 45.0,
        };
        assert!(GpuCamera::from_file(&up).is_err());
    }
}
