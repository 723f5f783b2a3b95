//! Built-in kernel objects.
//!
//! [`default_objects`] returns them in binding order:
//!
//! | object       | slots | resource                               |
//! |--------------|-------|----------------------------------------|
//! | PixelBuffer  | 1     | RGBA f32 accumulation buffer (rw)      |
//! | DeviceParams | 1     | `{width, height, passes, pass}` uniform |
//! | Tristimulus  | 1     | 81x1 colour matching image             |
//! | Geometry     | 3     | triangles, BVH nodes, scene info       |
//! | Materials    | 1     | material mapping                       |
//! | Camera       | 1     | focal plane corners and eye            |
//! | PRNG         | 1     | 32-byte seed block                     |
//! | Progress     | 0     |                                        |

mod camera;
mod device_params;
mod geometry;
mod materials;
mod output;
mod pixel_buffer;
mod prng;
mod progress;
mod tristimulus;

pub use camera::{Camera, CameraFile, GpuCamera};
pub use device_params::{DeviceParams, GpuParams};
pub use geometry::{Geometry, SceneInfo};
pub use materials::{Materials, MaterialsFile};
pub use output::{resolve, tonemap, write_image, xyz_to_rgb};
pub use pixel_buffer::PixelBuffer;
pub use prng::{Prng, SEED_BLOCK_SIZE};
pub use progress::{Progress, ProgressState};
pub use tristimulus::{curve_texels, Tristimulus, CURVE_SAMPLES};

use std::sync::Arc;
use std::time::Duration;

use crate::kernel::{teardown_all, EngineParams, KernelObject, Teardown};
use crate::util::Result;

/// Construct the standard object list in binding order.
///
/// If any object fails to initialize, the ones already built are released
/// before the error is returned.
pub fn default_objects(params: &Arc<EngineParams>) -> Result<Vec<Box<dyn KernelObject>>> {
    type Ctor = fn(&Arc<EngineParams>) -> Result<Box<dyn KernelObject>>;
    let ctors: [Ctor; 8] = [
        |p| Ok(Box::new(PixelBuffer::new(p)?)),
        |p| Ok(Box::new(DeviceParams::new(p)?)),
        |p| Ok(Box::new(Tristimulus::new(p)?)),
        |p| Ok(Box::new(Geometry::new(p)?)),
        |p| Ok(Box::new(Materials::new(p)?)),
        |p| Ok(Box::new(Camera::new(p)?)),
        |p| Ok(Box::new(Prng::new(p)?)),
        |p| {
            let warmup = Duration::from_secs_f64(p.config.eta_warmup_secs);
            Ok(Box::new(Progress::new(p.passes(), warmup)))
        },
    ];

    let mut objects: Vec<Box<dyn KernelObject>> = Vec::with_capacity(ctors.len());
    for ctor in ctors {
        match ctor(params) {
            Ok(object) => objects.push(object),
            Err(e) => {
                let _ = teardown_all(&mut objects, Teardown::Abort);
                return Err(e);
            }
        }
    }
    Ok(objects)
}
