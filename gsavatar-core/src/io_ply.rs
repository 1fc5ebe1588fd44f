//! Loader for photo-derived gaussian point clouds stored as binary PLY.
//!
//! The header is ASCII: an `element vertex <N>` line, `property float <name>`
//! lines in record order, terminated by `end_header`. The body is `N`
//! fixed-stride little-endian f32 records. Required properties are
//! `x, y, z`; color (`f_dc_0..2`), log-scale (`scale_0..2`) and logit
//! `opacity` are optional and default to zero when absent.

use anyhow::Context;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Raw (un-normalized, un-rigged) point cloud attributes as flat arrays.
#[derive(Debug, Default, Clone)]
pub struct PointCloud {
    pub num_points: usize,
    /// xyz, length 3N
    pub positions: Vec<f32>,
    /// spherical-harmonics DC term, length 3N
    pub colors_dc: Vec<f32>,
    /// stored in exponential space, length 3N
    pub log_scales: Vec<f32>,
    /// stored as logit, length N
    pub opacities: Vec<f32>,
}

enum PropSlot {
    Pos(usize),
    ColorDc(usize),
    LogScale(usize),
    Opacity,
    Skip,
}

fn prop_slot(name: &str) -> PropSlot {
    match name {
        "x" => PropSlot::Pos(0),
        "y" => PropSlot::Pos(1),
        "z" => PropSlot::Pos(2),
        "f_dc_0" => PropSlot::ColorDc(0),
        "f_dc_1" => PropSlot::ColorDc(1),
        "f_dc_2" => PropSlot::ColorDc(2),
        "scale_0" => PropSlot::LogScale(0),
        "scale_1" => PropSlot::LogScale(1),
        "scale_2" => PropSlot::LogScale(2),
        "opacity" => PropSlot::Opacity,
        _ => PropSlot::Skip,
    }
}

fn next_line<'b>(buffer: &'b [u8], offset: &mut usize) -> Option<&'b [u8]> {
    if *offset >= buffer.len() {
        return None;
    }
    let start = *offset;
    match memchr::memchr(b'\n', &buffer[*offset..]) {
        Some(pos) => {
            *offset = start + pos + 1;
            Some(&buffer[start..start + pos])
        }
        None => {
            *offset = buffer.len();
            Some(&buffer[start..])
        }
    }
}

/// Parse a binary PLY point cloud from an in-memory buffer.
pub fn parse_ply(raw_data: &[u8]) -> anyhow::Result<PointCloud> {
    let mut offset = 0usize;
    let mut num_points: Option<usize> = None;
    let mut prop_names: Vec<String> = vec![];
    loop {
        let line = next_line(raw_data, &mut offset)
            .context("no 'end_header' found before end of file")?;
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.starts_with(b"end_header") {
            break;
        }
        if line == b"ply" || line.starts_with(b"format ") || line.starts_with(b"comment ") {
            continue;
        }
        if let Some(rest) = line.strip_prefix(b"element vertex ") {
            let s = std::str::from_utf8(rest).context("non-utf8 vertex count")?;
            let n: usize = s.trim().parse().context("malformed vertex count")?;
            num_points = Some(n);
            continue;
        }
        if line.starts_with(b"element ") {
            anyhow::bail!("unsupported element: {}", String::from_utf8_lossy(line));
        }
        if let Some(rest) = line.strip_prefix(b"property float ") {
            let s = std::str::from_utf8(rest).context("non-utf8 property name")?;
            prop_names.push(s.trim().to_string());
            continue;
        }
        if line.starts_with(b"property ") {
            anyhow::bail!(
                "only float properties are supported: {}",
                String::from_utf8_lossy(line)
            );
        }
    }
    // a header without the vertex-count token is a hard error, never 0 points
    let num_points = num_points.context("header has no 'element vertex' line")?;

    let slots: Vec<PropSlot> = prop_names.iter().map(|n| prop_slot(n)).collect();
    for (name, required) in [("x", 0usize), ("y", 1), ("z", 2)] {
        anyhow::ensure!(
            slots
                .iter()
                .any(|s| matches!(s, PropSlot::Pos(i) if *i == required)),
            "required property '{}' is missing",
            name
        );
    }

    let expected_bytes = num_points
        .checked_mul(prop_names.len())
        .and_then(|n| n.checked_mul(4))
        .context("overflow in record byte count")?;
    anyhow::ensure!(
        raw_data.len() >= offset + expected_bytes,
        "binary section too short: need {} bytes, have {}",
        expected_bytes,
        raw_data.len() - offset
    );

    let mut cloud = PointCloud {
        num_points,
        positions: vec![0f32; num_points * 3],
        colors_dc: vec![0f32; num_points * 3],
        log_scales: vec![0f32; num_points * 3],
        opacities: vec![0f32; num_points],
    };
    let mut rdr = Cursor::new(&raw_data[offset..offset + expected_bytes]);
    for i_pnt in 0..num_points {
        for slot in &slots {
            let v = rdr.read_f32::<LittleEndian>()?;
            match slot {
                PropSlot::Pos(k) => cloud.positions[i_pnt * 3 + k] = v,
                PropSlot::ColorDc(k) => cloud.colors_dc[i_pnt * 3 + k] = v,
                PropSlot::LogScale(k) => cloud.log_scales[i_pnt * 3 + k] = v,
                PropSlot::Opacity => cloud.opacities[i_pnt] = v,
                PropSlot::Skip => {}
            }
        }
    }
    Ok(cloud)
}

pub fn read_ply<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<PointCloud> {
    let raw_data = std::fs::read(&path)
        .with_context(|| format!("cannot read point cloud {:?}", path.as_ref()))?;
    parse_ply(&raw_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn build_ply(props: &[&str], records: &[Vec<f32>]) -> Vec<u8> {
        let mut buf = Vec::<u8>::new();
        buf.extend_from_slice(b"ply\nformat binary_little_endian 1.0\n");
        buf.extend_from_slice(format!("element vertex {}\n", records.len()).as_bytes());
        for p in props {
            buf.extend_from_slice(format!("property float {}\n", p).as_bytes());
        }
        buf.extend_from_slice(b"end_header\n");
        for rec in records {
            assert_eq!(rec.len(), props.len());
            for &v in rec {
                buf.write_f32::<LittleEndian>(v).unwrap();
            }
        }
        buf
    }

    #[test]
    fn test_parse_full_properties() {
        let props = [
            "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "scale_0", "scale_1", "scale_2",
            "opacity",
        ];
        let records = vec![
            vec![1., 2., 3., 0.1, 0.2, 0.3, -4., -4., -4., 0.5],
            vec![4., 5., 6., 0.4, 0.5, 0.6, -3., -3., -3., -0.5],
        ];
        let cloud = parse_ply(&build_ply(&props, &records)).unwrap();
        assert_eq!(cloud.num_points, 2);
        assert_eq!(cloud.positions.len(), 3 * cloud.num_points);
        assert_eq!(cloud.colors_dc.len(), 3 * cloud.num_points);
        assert_eq!(cloud.log_scales.len(), 3 * cloud.num_points);
        assert_eq!(cloud.opacities.len(), cloud.num_points);
        assert_eq!(cloud.positions[3..6], [4., 5., 6.]);
        assert_eq!(cloud.opacities[1], -0.5);
    }

    #[test]
    fn test_optional_properties_default_to_zero() {
        let cloud = parse_ply(&build_ply(&["x", "y", "z"], &[vec![0., 1.8, 0.]])).unwrap();
        assert_eq!(cloud.colors_dc, vec![0., 0., 0.]);
        assert_eq!(cloud.log_scales, vec![0., 0., 0.]);
        assert_eq!(cloud.opacities, vec![0.]);
    }

    #[test]
    fn test_unknown_property_is_skipped() {
        let cloud = parse_ply(&build_ply(
            &["x", "y", "z", "nx"],
            &[vec![1., 2., 3., 9.]],
        ))
        .unwrap();
        assert_eq!(cloud.positions, vec![1., 2., 3.]);
    }

    #[test]
    fn test_missing_vertex_count_is_fatal() {
        let mut buf = Vec::<u8>::new();
        buf.extend_from_slice(b"ply\nproperty float x\nend_header\n");
        assert!(parse_ply(&buf).is_err());
    }

    #[test]
    fn test_truncated_binary_is_fatal() {
        let mut buf = build_ply(&["x", "y", "z"], &[vec![1., 2., 3.]]);
        buf.truncate(buf.len() - 4);
        assert!(parse_ply(&buf).is_err());
    }
}
