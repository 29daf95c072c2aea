//! Point encoding
//!
//! Header block payload:
//!
//! ```text
//! bit 28..31  geometry subtype (1 = point)
//! bit 32..35  dimension
//! bit 36..39  CRS table
//! bit 40..55  CRS code
//! bit 60      precision (1 = f64 coordinates)
//! ```
//!
//! Coordinates follow as raw f64 bits, one block each.

use super::types::{self, PAYLOAD_SHIFT, PropertyType};
use super::value::{CoordinateSystem, Point};
use crate::{Error, Result};

const SUBTYPE_POINT: u64 = 1;
const DOUBLE_PRECISION: u64 = 1 << 60;

const TABLE_CARTESIAN: u16 = 1;
const TABLE_WGS84: u16 = 2;

/// CRS table and code for a coordinate system and dimension
fn crs_of(system: CoordinateSystem, dimension: usize) -> (u16, u16) {
    match (system, dimension) {
        (CoordinateSystem::Cartesian, 3) => (TABLE_CARTESIAN, 9157),
        (CoordinateSystem::Cartesian, _) => (TABLE_CARTESIAN, 7203),
        (CoordinateSystem::WGS84, 3) => (TABLE_WGS84, 4979),
        (CoordinateSystem::WGS84, _) => (TABLE_WGS84, 4326),
    }
}

fn system_of(table: u16, code: u16, dimension: usize) -> Result<CoordinateSystem> {
    let system = match (table, code) {
        (TABLE_CARTESIAN, 7203) | (TABLE_CARTESIAN, 9157) => CoordinateSystem::Cartesian,
        (TABLE_WGS84, 4326) | (TABLE_WGS84, 4979) => CoordinateSystem::WGS84,
        _ => {
            return Err(Error::codec(format!(
                "Unknown coordinate reference system {}:{}",
                table, code
            )));
        }
    };
    if crs_of(system, dimension) != (table, code) {
        return Err(Error::codec(format!(
            "CRS {}:{} does not have {} dimensions",
            table, code, dimension
        )));
    }
    Ok(system)
}

fn point_from(system: CoordinateSystem, coords: &[f64]) -> Result<Point> {
    match *coords {
        [x, y] => Ok(Point::new_2d(x, y, system)),
        [x, y, z] => Ok(Point::new_3d(x, y, z, system)),
        _ => Err(Error::codec(format!(
            "point with {} coordinates",
            coords.len()
        ))),
    }
}

/// Encode a point into a header block plus one block per coordinate
pub fn encode(key: u32, point: &Point) -> Result<Vec<u64>> {
    let dimension = point.dimension();
    let (table, code) = crs_of(point.coordinate_system, dimension);

    let mut header = types::header(key, PropertyType::Geometry)?;
    header |= SUBTYPE_POINT << PAYLOAD_SHIFT;
    header |= (dimension as u64) << 32;
    header |= (table as u64) << 36;
    header |= (code as u64) << 40;
    header |= DOUBLE_PRECISION;

    let mut blocks = Vec::with_capacity(1 + dimension);
    blocks.push(header);
    blocks.extend(point.coordinates().into_iter().map(f64::to_bits));
    Ok(blocks)
}

fn read_header(header: u64) -> Result<(usize, u16, u16)> {
    let subtype = (header >> PAYLOAD_SHIFT) & 0xF;
    if subtype != SUBTYPE_POINT {
        return Err(Error::codec(format!("Unknown geometry subtype {}", subtype)));
    }
    let dimension = ((header >> 32) & 0xF) as usize;
    if !(2..=3).contains(&dimension) {
        return Err(Error::codec(format!("Unsupported point dimension {}", dimension)));
    }
    if header & DOUBLE_PRECISION == 0 {
        return Err(Error::codec("single precision points are not supported"));
    }
    let table = ((header >> 36) & 0xF) as u16;
    let code = ((header >> 40) & 0xFFFF) as u16;
    Ok((dimension, table, code))
}

/// Blocks occupied by the point whose header is `header`
pub fn block_count(header: u64) -> Result<usize> {
    Ok(1 + read_header(header)?.0)
}

/// Decode a point from its blocks
pub fn decode(blocks: &[u64]) -> Result<Point> {
    let header = *blocks
        .first()
        .ok_or_else(|| Error::codec("geometry without header block"))?;
    let (dimension, table, code) = read_header(header)?;
    let system = system_of(table, code, dimension)?;
    let coords: Vec<f64> = blocks
        .get(1..=dimension)
        .ok_or_else(|| Error::codec("geometry coordinates truncated"))?
        .iter()
        .map(|&bits| f64::from_bits(bits))
        .collect();
    point_from(system, &coords)
}

/// Array payload: subtype, dimension, CRS table, CRS code (u16 LE), then f64 LE coordinates
pub(crate) fn encode_array(points: &[Point], out: &mut Vec<u8>) -> Result<()> {
    let (system, dimension) = match points.first() {
        Some(first) => (first.coordinate_system, first.dimension()),
        None => (CoordinateSystem::Cartesian, 2),
    };
    if points
        .iter()
        .any(|p| p.coordinate_system != system || p.dimension() != dimension)
    {
        return Err(Error::codec(
            "point array elements must share coordinate system and dimension",
        ));
    }
    let (table, code) = crs_of(system, dimension);
    out.push(SUBTYPE_POINT as u8);
    out.push(dimension as u8);
    out.push(table as u8);
    out.extend_from_slice(&code.to_le_bytes());
    for point in points {
        for coord in point.coordinates() {
            out.extend_from_slice(&coord.to_le_bytes());
        }
    }
    Ok(())
}

/// Inverse of [`encode_array`]; `data` starts after the element tag
pub(crate) fn decode_array(data: &[u8]) -> Result<Vec<Point>> {
    let [subtype, dimension, table, code_lo, code_hi, coords @ ..] = data else {
        return Err(Error::codec("point array header truncated"));
    };
    if *subtype as u64 != SUBTYPE_POINT {
        return Err(Error::codec(format!("Unknown geometry subtype {}", subtype)));
    }
    let dimension = *dimension as usize;
    let code = u16::from_le_bytes([*code_lo, *code_hi]);
    let system = system_of(*table as u16, code, dimension)?;

    let stride = dimension * 8;
    if coords.len() % stride != 0 {
        return Err(Error::codec("point array coordinates truncated"));
    }
    coords
        .chunks_exact(stride)
        .map(|chunk| {
            let values: Vec<f64> = chunk
                .chunks_exact(8)
                .map(|b| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(b);
                    f64::from_le_bytes(raw)
                })
                .collect();
            point_from(system, &values)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_blocks() {
        let point = Point::new_2d(1.5, -2.0, CoordinateSystem::Cartesian);
        let blocks = encode(7, &point).unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(block_count(blocks[0]).unwrap(), 3);
        assert_eq!(types::key_of_header(blocks[0]), 7);
        assert_eq!(decode(&blocks).unwrap(), point);
    }

    #[test]
    fn test_wgs84_3d_point() {
        let point = Point::new_3d(-122.4194, 37.7749, 12.0, CoordinateSystem::WGS84);
        let blocks = encode(1, &point).unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(decode(&blocks).unwrap(), point);
    }

    #[test]
    fn test_unknown_crs_rejected() {
        let point = Point::new_2d(0.0, 0.0, CoordinateSystem::Cartesian);
        let mut blocks = encode(1, &point).unwrap();
        blocks[0] = (blocks[0] & !(0xFFFFu64 << 40)) | (1234u64 << 40);
        assert!(decode(&blocks).unwrap_err().is_corruption());
    }

    #[test]
    fn test_point_array_payload() {
        let points = vec![
            Point::new_2d(1.0, 2.0, CoordinateSystem::WGS84),
            Point::new_2d(3.0, 4.0, CoordinateSystem::WGS84),
        ];
        let mut buf = Vec::new();
        encode_array(&points, &mut buf).unwrap();
        assert_eq!(decode_array(&buf).unwrap(), points);

        let mixed = vec![
            Point::new_2d(1.0, 2.0, CoordinateSystem::WGS84),
            Point::new_3d(1.0, 2.0, 3.0, CoordinateSystem::WGS84),
        ];
        assert!(encode_array(&mixed, &mut Vec::new()).is_err());
    }
}
