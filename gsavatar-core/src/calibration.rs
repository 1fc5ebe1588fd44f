//! Scale normalization and camera framing for a freshly loaded point cloud.
//!
//! Raw photo-derived clouds come in arbitrary units. Everything downstream
//! (rigging bands, pose pivots, splat scales) assumes the canonical space
//! produced here: uniform scale to a canonical body height, centered on X/Z,
//! floor-aligned on Y.

/// Canonical body height in length units.
pub const TARGET_HEIGHT: f32 = 1.70;

/// Fraction of the field of view the body height should occupy.
pub const VERTICAL_FILL: f32 = 0.90;
/// Horizontal fit allows the box to overfill the view.
pub const HORIZONTAL_FILL: f32 = 1.20;
const HORIZONTAL_MARGIN: f32 = 1.05;
/// Look target sits at this fraction of the body height (upper-body bias).
const TARGET_HEIGHT_FRACTION: f32 = 0.70;

#[derive(Debug, Clone, Copy)]
pub struct Aabb3 {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb3 {
    pub fn from_points(xyz: &[f32]) -> Self {
        assert_eq!(xyz.len() % 3, 0);
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for p in xyz.chunks_exact(3) {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Aabb3 { min, max }
    }

    pub fn center(&self) -> [f32; 3] {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    pub fn size(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn height(&self) -> f32 {
        self.max[1] - self.min[1]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Calibration {
    /// uniform scale applied to raw positions
    pub scale: f32,
    pub aabb_raw: Aabb3,
    pub aabb_norm: Aabb3,
}

/// Scale and center positions in place so the cloud spans `target_height` on
/// Y with its floor at 0 and its X/Z centroid at the origin.
pub fn normalize_points(xyz: &mut [f32], target_height: f32) -> anyhow::Result<Calibration> {
    anyhow::ensure!(!xyz.is_empty(), "cannot calibrate an empty point cloud");
    let aabb_raw = Aabb3::from_points(xyz);
    let height = aabb_raw.height();
    anyhow::ensure!(
        height > f32::EPSILON,
        "degenerate point cloud: zero bounding-box height"
    );
    let scale = target_height / height;
    let center = aabb_raw.center();
    for p in xyz.chunks_exact_mut(3) {
        p[0] = (p[0] - center[0]) * scale;
        p[1] = (p[1] - aabb_raw.min[1]) * scale;
        p[2] = (p[2] - center[2]) * scale;
    }
    let aabb_norm = Aabb3::from_points(xyz);
    Ok(Calibration {
        scale,
        aabb_raw,
        aabb_norm,
    })
}

/// Per-point log-scales live in exponential space, so the uniform calibration
/// scale becomes an additive shift.
pub fn shift_log_scales(log_scales: &mut [f32], scale: f32) {
    let shift = scale.ln();
    for s in log_scales.iter_mut() {
        *s += shift;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CameraPose {
    pub position: [f32; 3],
    pub target: [f32; 3],
}

/// Place the camera on +Z so the normalized box fits the configured
/// vertical/horizontal view fractions, aimed at the upper body.
pub fn frame_camera(aabb_norm: &Aabb3, fov_y_deg: f32, aspect: f32) -> CameraPose {
    let size = aabb_norm.size();
    let center = aabb_norm.center();
    let tan_y = (0.5 * fov_y_deg.to_radians()).tan();
    let tan_x = tan_y * aspect;
    let dist_v = (0.5 * size[1]) / (VERTICAL_FILL * tan_y);
    let dist_h = (0.5 * size[0] * HORIZONTAL_MARGIN) / (HORIZONTAL_FILL * tan_x);
    let dist = dist_v.max(dist_h);
    let target = [
        center[0],
        aabb_norm.min[1] + TARGET_HEIGHT_FRACTION * size[1],
        center[2],
    ];
    CameraPose {
        position: [target[0], target[1], target[2] + dist],
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_four_point_cloud() {
        // heights 0, 0.6, 1.2, 1.8 in arbitrary units
        let mut xyz = vec![
            0.3, 0.0, 0.1, //
            -0.2, 0.6, 0.0, //
            0.1, 1.2, -0.1, //
            0.0, 1.8, 0.0,
        ];
        let calib = normalize_points(&mut xyz, TARGET_HEIGHT).unwrap();
        assert!((calib.aabb_norm.height() - TARGET_HEIGHT).abs() < 1.0e-5);
        // the point originally at max height lands at the target height
        assert!((xyz[3 * 3 + 1] - TARGET_HEIGHT).abs() < 1.0e-5);
        // the point originally at min height lands on the floor
        assert!(xyz[1].abs() < 1.0e-6);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut xyz = vec![1., 2., 3., -4., 30., 2., 5., -7., -3.];
        normalize_points(&mut xyz, TARGET_HEIGHT).unwrap();
        let again = normalize_points(&mut xyz, TARGET_HEIGHT).unwrap();
        assert!((again.scale - 1.).abs() < 1.0e-5);
        assert!((again.aabb_norm.height() - TARGET_HEIGHT).abs() < 1.0e-5);
    }

    #[test]
    fn test_degenerate_height_is_fatal() {
        let mut xyz = vec![0., 1., 0., 2., 1., 3.];
        assert!(normalize_points(&mut xyz, TARGET_HEIGHT).is_err());
    }

    #[test]
    fn test_log_scale_shift() {
        let mut log_scales = vec![0.0f32, -1.0];
        shift_log_scales(&mut log_scales, 2.0);
        assert!((log_scales[0].exp() - 2.0).abs() < 1.0e-6);
        assert!((log_scales[1].exp() - 2.0 * (-1.0f32).exp()).abs() < 1.0e-6);
    }

    #[test]
    fn test_camera_aims_at_upper_body() {
        let aabb = Aabb3 {
            min: [-0.3, 0., -0.2],
            max: [0.3, TARGET_HEIGHT, 0.2],
        };
        let pose = frame_camera(&aabb, 45., 1.);
        assert!((pose.target[1] - 0.7 * TARGET_HEIGHT).abs() < 1.0e-5);
        assert!(pose.position[2] > aabb.max[2]);
    }
}
