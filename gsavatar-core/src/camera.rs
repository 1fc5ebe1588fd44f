//! Column-major 4x4 camera math over flat `[f32; 16]` buffers.
//!
//! Matrices cross module boundaries as flat column-major arrays; `nalgebra`
//! does the heavy lifting internally.

pub fn camera_perspective(fov_y_deg: f32, aspect: f32, near: f32, far: f32) -> [f32; 16] {
    let proj = nalgebra::Matrix4::<f32>::new_perspective(aspect, fov_y_deg.to_radians(), near, far);
    let mut m = [0f32; 16];
    m.copy_from_slice(proj.as_slice());
    m
}

pub fn camera_external(eye: &[f32; 3], target: &[f32; 3], up: &[f32; 3]) -> [f32; 16] {
    let view = nalgebra::Matrix4::<f32>::look_at_rh(
        &nalgebra::Point3::new(eye[0], eye[1], eye[2]),
        &nalgebra::Point3::new(target[0], target[1], target[2]),
        &nalgebra::Vector3::new(up[0], up[1], up[2]),
    );
    let mut m = [0f32; 16];
    m.copy_from_slice(view.as_slice());
    m
}

pub fn mult_mat_col_major(a: &[f32; 16], b: &[f32; 16]) -> [f32; 16] {
    let a = nalgebra::Matrix4::<f32>::from_column_slice(a);
    let b = nalgebra::Matrix4::<f32>::from_column_slice(b);
    let c = a * b;
    let mut m = [0f32; 16];
    m.copy_from_slice(c.as_slice());
    m
}

/// Transform a point by a projective matrix with perspective division.
/// `None` if the homogeneous coordinate vanishes.
pub fn transform_homogeneous(m: &[f32; 16], p: &[f32; 3]) -> Option<[f32; 3]> {
    let w = m[3] * p[0] + m[7] * p[1] + m[11] * p[2] + m[15];
    if w.abs() < f32::EPSILON {
        return None;
    }
    let x = m[0] * p[0] + m[4] * p[1] + m[8] * p[2] + m[12];
    let y = m[1] * p[0] + m[5] * p[1] + m[9] * p[2] + m[13];
    let z = m[2] * p[0] + m[6] * p[1] + m[10] * p[2] + m[14];
    Some([x / w, y / w, z / w])
}

/// Transform a point by an affine matrix (no division).
pub fn transform_affine(m: &[f32; 16], p: &[f32; 3]) -> [f32; 3] {
    [
        m[0] * p[0] + m[4] * p[1] + m[8] * p[2] + m[12],
        m[1] * p[0] + m[5] * p[1] + m[9] * p[2] + m[13],
        m[2] * p[0] + m[6] * p[1] + m[10] * p[2] + m[14],
    ]
}

/// 2x3 column-major transform from NDC `[-1, 1]` to pixel coordinates
/// (y flipped so that row 0 is the top of the image).
pub fn transform_ndc2pix(img_shape: (usize, usize)) -> [f32; 6] {
    [
        0.5 * img_shape.0 as f32,
        0.,
        0.,
        -0.5 * img_shape.1 as f32,
        0.5 * img_shape.0 as f32,
        0.5 * img_shape.1 as f32,
    ]
}

pub fn mult_vec3_2x3(m: &[f32; 6], v: &[f32; 3]) -> [f32; 2] {
    [
        m[0] * v[0] + m[2] * v[1] + m[4] * v[2],
        m[1] * v[0] + m[3] * v[1] + m[5] * v[2],
    ]
}

/// Pixels per world unit at view depth 1 for a vertical field of view.
pub fn focal_pix_y(fov_y_deg: f32, img_height: usize) -> f32 {
    0.5 * img_height as f32 / (0.5 * fov_y_deg.to_radians()).tan()
}

/// Everything a render pass needs to project world points to pixels.
#[derive(Debug, Clone)]
pub struct CameraMats {
    pub world2ndc: [f32; 16],
    pub world2view: [f32; 16],
    pub focal_y_pix: f32,
    pub img_shape: (usize, usize),
}

impl CameraMats {
    pub fn new(
        eye: &[f32; 3],
        target: &[f32; 3],
        fov_y_deg: f32,
        img_shape: (usize, usize),
        near: f32,
        far: f32,
    ) -> Self {
        let aspect = img_shape.0 as f32 / img_shape.1 as f32;
        let proj = camera_perspective(fov_y_deg, aspect, near, far);
        let view = camera_external(eye, target, &[0., 1., 0.]);
        CameraMats {
            world2ndc: mult_mat_col_major(&proj, &view),
            world2view: view,
            focal_y_pix: focal_pix_y(fov_y_deg, img_shape.1),
            img_shape,
        }
    }
}
