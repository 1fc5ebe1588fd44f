//! Shared synthetic point clouds for unit tests.

use crate::calibration::TARGET_HEIGHT;
use byteorder::{LittleEndian, WriteBytesExt};

/// Deterministic synthetic humanoid: a vertical trunk, a head blob, a wide
/// chest with shoulder tips, and chin points in front of the neck. Already
/// in normalized space (height = `TARGET_HEIGHT`, floor at 0).
pub fn humanoid_cloud() -> Vec<f32> {
    let h = TARGET_HEIGHT;
    let mut xyz = Vec::<f32>::new();
    let mut push = |x: f32, y: f32, z: f32| {
        xyz.push(x);
        xyz.push(y);
        xyz.push(z);
    };
    // trunk and legs: columns of points from floor to neck
    for i in 0..60 {
        let y = h * (i as f32 + 0.5) / 60.;
        for (dx, dz) in [(0., 0.), (0.07, 0.03), (-0.07, -0.03), (0.03, -0.06)] {
            push(dx, y, dz);
        }
    }
    // head blob
    for i in 0..40 {
        let a = i as f32 * 0.77;
        let y = h * (0.91 + 0.08 * ((i % 5) as f32 / 5.));
        push(0.06 * a.sin(), y, 0.06 * a.cos());
    }
    // chest width with shoulder tips
    for i in 0..20 {
        let x = -0.25 + 0.5 * (i as f32 + 0.5) / 20.;
        push(x, h * 0.82, 0.01);
        push(x, h * 0.85, -0.01);
    }
    // chin cluster in front of the neck
    for i in 0..12 {
        let t = i as f32 / 12.;
        push(0.02 * (t - 0.5), h * (0.895 + 0.02 * t), 0.07 + 0.01 * t);
    }
    xyz
}

/// The humanoid cloud serialized as a binary PLY in arbitrary units, with
/// color, log-scale and logit-opacity properties.
pub fn humanoid_ply_bytes() -> Vec<u8> {
    let xyz = humanoid_cloud();
    let num_points = xyz.len() / 3;
    let mut buf = Vec::<u8>::new();
    buf.extend_from_slice(b"ply\nformat binary_little_endian 1.0\n");
    buf.extend_from_slice(format!("element vertex {}\n", num_points).as_bytes());
    for name in [
        "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "scale_0", "scale_1", "scale_2", "opacity",
    ] {
        buf.extend_from_slice(format!("property float {}\n", name).as_bytes());
    }
    buf.extend_from_slice(b"end_header\n");
    for i_pnt in 0..num_points {
        let p = &xyz[i_pnt * 3..i_pnt * 3 + 3];
        // raw space: double the normalized coordinates
        for &v in p {
            buf.write_f32::<LittleEndian>(v * 2.).unwrap();
        }
        // color varies with height so renders are not flat
        buf.write_f32::<LittleEndian>(0.8).unwrap();
        buf.write_f32::<LittleEndian>(p[1] / TARGET_HEIGHT).unwrap();
        buf.write_f32::<LittleEndian>(0.3).unwrap();
        for _ in 0..3 {
            buf.write_f32::<LittleEndian>(-5.0).unwrap();
        }
        buf.write_f32::<LittleEndian>(2.0).unwrap();
    }
    buf
}
