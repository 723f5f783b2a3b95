//! Final image resolve and file output.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::hdr::HdrEncoder;
use image::Rgb;

use crate::util::{Result, Vec3};

const LUMINANCE_EPSILON: f32 = 1e-6;
const GAMMA: f32 = 2.2;

/// Divide accumulated colour by the sample weight in alpha.
///
/// Pixels that never received a sample resolve to black.
pub fn resolve(accum: &[[f32; 4]]) -> Vec<Vec3> {
    accum
        .iter()
        .map(|&[x, y, z, w]| {
            if w > 0.0 {
                Vec3::new(x, y, z) / w
            } else {
                Vec3::ZERO
            }
        })
        .collect()
}

/// CIE XYZ to linear sRGB (D65).
pub fn xyz_to_rgb(xyz: Vec3) -> Vec3 {
    Vec3::new(
        3.240_479 * xyz.x - 1.537_150 * xyz.y - 0.498_535 * xyz.z,
        -0.969_256 * xyz.x + 1.875_992 * xyz.y + 0.041_556 * xyz.z,
        0.055_648 * xyz.x - 0.204_043 * xyz.y + 1.057_311 * xyz.z,
    )
}

#[inline]
fn luminance(rgb: Vec3) -> f32 {
    0.2126 * rgb.x + 0.7152 * rgb.y + 0.0722 * rgb.z
}

/// Reinhard operator keyed on the log-average luminance of the image.
pub fn tonemap(pixels: &mut [Vec3], exposure: f32) {
    if pixels.is_empty() {
        return;
    }
    let log_sum: f32 = pixels
        .iter()
        .map(|&p| luminance(p))
        .filter(|&l| l > LUMINANCE_EPSILON)
        .map(f32::ln)
        .sum();
    let log_avg = (log_sum / pixels.len() as f32).exp();

    for p in pixels.iter_mut() {
        let l = luminance(*p);
        if l <= LUMINANCE_EPSILON {
            *p = Vec3::ZERO;
            continue;
        }
        let scaled = exposure / log_avg * l;
        *p *= (scaled / (1.0 + scaled)) / l;
    }
}

/// Gamma-encode and quantize one channel.
#[inline]
pub fn to_byte(v: f32) -> u8 {
    (v.max(0.0).powf(1.0 / GAMMA) * 255.0).round().min(255.0) as u8
}

/// Write the resolved image. `.hdr` keeps linear radiance; any other path
/// gets a tone-mapped PPM (`P3`).
#[tracing::instrument(skip_all, fields(path = %path.display(), width, height))]
pub fn write_image(
    path: &Path,
    width: u32,
    height: u32,
    pixels: &[Vec3],
    exposure: f32,
) -> Result<()> {
    let is_hdr = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("hdr"));
    let writer = BufWriter::new(File::create(path)?);

    if is_hdr {
        let rgb: Vec<Rgb<f32>> = pixels.iter().map(|&p| Rgb(xyz_to_rgb(p).max(Vec3::ZERO).into())).collect();
        HdrEncoder::new(writer).encode(&rgb, width as usize, height as usize)?;
    } else {
        let mut rgb: Vec<Vec3> = pixels.iter().map(|&p| xyz_to_rgb(p).max(Vec3::ZERO)).collect();
        tonemap(&mut rgb, exposure);
        write_ppm(writer, width, height, &rgb)?;
    }

    tracing::info!("wrote {width}x{height} image");
    Ok(())
}

fn write_ppm<W: Write>(mut w: W, width: u32, height: u32, rgb: &[Vec3]) -> Result<()> {
    writeln!(w, "P3")?;
    writeln!(w, "{width} {height} 255")?;
    for row in rgb.chunks(width.max(1) as usize) {
        let line: Vec<String> = row
            .iter()
            .map(|p| format!("{} {} {}", to_byte(p.x), to_byte(p.y), to_byte(p.z)))
            .collect();
        writeln!(w, "{}", line.join(" "))?;
    }
    w.flush()?;
    Ok(())
}
