//! Binary geometry record stream.
//!
//! Little-endian sequence of entities, each introduced by an 8-byte header
//! `{type: u32, subtype: u32}`. Only primitive entities are understood:
//!
//! ```text
//! material: i32, light: i32, p1: [f32; 3], p2: [f32; 3], p3: [f32; 3]
//! ```

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::geometry::Triangle;
use crate::util::{Error, Result, Vec3};

/// Entity type tag of a triangle primitive.
pub const ENTITY_PRIMITIVE: u32 = 5;

const HEADER_SIZE: usize = 8;

/// Read every triangle from a geometry record stream.
///
/// A stream without any primitive is rejected: there is nothing to build a
/// hierarchy over.
pub fn read_geometry<R: Read>(mut reader: R) -> Result<Vec<Triangle>> {
    let mut triangles = Vec::new();
    let mut header = [0u8; HEADER_SIZE];

    loop {
        match read_up_to(&mut reader, &mut header)? {
            0 => break,
            HEADER_SIZE => {}
            n => {
                return Err(Error::invalid_scene(format!(
                    "truncated entity header ({n} of {HEADER_SIZE} bytes)"
                )))
            }
        }

        let mut h = &header[..];
        let entity = h.read_u32::<LittleEndian>()?;
        let _subtype = h.read_u32::<LittleEndian>()?;

        if entity != ENTITY_PRIMITIVE {
            return Err(Error::invalid_scene(format!(
                "unsupported entity type {entity} after {} primitives",
                triangles.len()
            )));
        }

        let triangle = read_primitive(&mut reader).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::invalid_scene(format!("truncated primitive #{}", triangles.len()))
            }
            _ => Error::Io(e),
        })??;
        triangles.push(triangle);
    }

    if triangles.is_empty() {
        return Err(Error::invalid_scene("geometry stream holds no primitives"));
    }
    Ok(triangles)
}

fn read_primitive<R: Read>(reader: &mut R) -> io::Result<Result<Triangle>> {
    let material = reader.read_i32::<LittleEndian>()?;
    let _light = reader.read_i32::<LittleEndian>()?;
    let mut p = [Vec3::ZERO; 3];
    for v in &mut p {
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let z = reader.read_f32::<LittleEndian>()?;
        *v = Vec3::new(x, y, z);
    }

    if material < 0 {
        return Ok(Err(Error::invalid_scene(format!("negative material index {material}"))));
    }
    if !p.iter().all(|v| v.is_finite()) {
        return Ok(Err(Error::invalid_scene("non-finite vertex")));
    }
    Ok(Ok(Triangle::new(p[0], p[1], p[2], material as u32)))
}

/// Fill `buf` as far as the stream allows; returns the byte count.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Write triangles as a geometry record stream.
pub fn write_geometry<W: Write>(mut writer: W, triangles: &[Triangle]) -> Result<()> {
    for t in triangles {
        writer.write_u32::<LittleEndian>(ENTITY_PRIMITIVE)?;
        writer.write_u32::<LittleEndian>(0)?;
        writer.write_i32::<LittleEndian>(t.material() as i32)?;
        writer.write_i32::<LittleEndian>(0)?;
        for v in t.vertices() {
            writer.write_f32::<LittleEndian>(v.x)?;
            writer.write_f32::<LittleEndian>(v.y)?;
            writer.write_f32::<LittleEndian>(v.z)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Open box of 8 triangles: floor, left, right and back walls.
pub fn example_box() -> Vec<Triangle> {
    let v = Vec3::new;
    vec![
        Triangle::new(v(-5.0, -5.0, -20.0), v(5.0, -5.0, -20.0), v(5.0, -5.0, 5.0), 0),
        Triangle::new(v(-5.0, -5.0, -20.0), v(5.0, -5.0, 5.0), v(-5.0, -5.0, 5.0), 0),
        Triangle::new(v(-5.0, -5.0, -20.0), v(-5.0, -5.0, 5.0), v(-5.0, 5.0, 5.0), 1),
        Triangle::new(v(-5.0, -5.0, -20.0), v(-5.0, 5.0, 5.0), v(-5.0, 5.0, -20.0), 1),
        Triangle::new(v(5.0, -5.0, -20.0), v(5.0, -5.0, 5.0), v(5.0, 5.0, 5.0), 2),
        Triangle::new(v(5.0, -5.0, -20.0), v(5.0, 5.0, 5.0), v(5.0, 5.0, -20.0), 2),
        Triangle::new(v(-5.0, -5.0, 5.0), v(5.0, -5.0, 5.0), v(5.0, 5.0, 5.0), 0),
        Triangle::new(v(-5.0, -5.0, 5.0), v(5.0, 5.0, 5.0), v(-5.0, 5.0, 5.0), 0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_box() {
        let tris = example_box();
        let mut bytes = Vec::new();
        write_geometry(&mut bytes, &tris).unwrap();
        assert_eq!(bytes.len(), tris.len() * (HEADER_SIZE + 44));
        assert_eq!(read_geometry(bytes.as_slice()).unwrap(), tris);
    }

    #[test]
    fn test_empty_stream_rejected() {
        let err = read_geometry(&[][..]).unwrap_err();
        assert!(matches!(err, Error::InvalidScene(_)));
    }

    #[test]
    fn test_truncated_stream() {
        let mut bytes = Vec::new();
        write_geometry(&mut bytes, &example_box()[..1]).unwrap();

        let err = read_geometry(&bytes[..HEADER_SIZE + 10]).unwrap_err();
        assert!(matches!(err, Error::InvalidScene(_)));

        let err = read_geometry(&bytes[..3]).unwrap_err();
        assert!(matches!(err, Error::InvalidScene(_)));
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        let err = read_geometry(bytes.as_slice()).unwrap_err();
        assert!(err.to_string().contains("unsupported entity type 1"));
    }
}
