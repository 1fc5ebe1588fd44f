//! Fixed 8-bone upper-body skeleton and the per-frame pose solve.
//!
//! The hierarchy is a static table. Per frame the solver recomputes every
//! bone's pivot-relative local rotation from elapsed time and the current
//! lip-sync level, then flattens parent-child composition into a 64-slot
//! matrix table consumed by the skinning pass.

pub const NUM_BONES: usize = 8;
/// Matrix table size; slots beyond the real bones stay identity.
pub const MAX_BONE_SLOTS: usize = 64;

pub const CHEST_SWAY_AMPLITUDE: f32 = 0.015;
pub const HEAD_SWAY_AMPLITUDE: f32 = 0.01;
pub const JAW_MAX_ANGLE: f32 = 0.5;
const SHOULDER_DROP_ANGLE: f32 = 0.06;
const BREATHING_PERIOD: f32 = 4.2;
const HEAD_SWAY_PERIOD_PITCH: f32 = 5.3;
const HEAD_SWAY_PERIOD_YAW: f32 = 7.1;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bone {
    Hip = 0,
    Spine = 1,
    Chest = 2,
    Neck = 3,
    Head = 4,
    Jaw = 5,
    ShoulderL = 6,
    ShoulderR = 7,
}

impl Bone {
    /// Topological order: every bone appears after its parent.
    pub const ALL: [Bone; NUM_BONES] = [
        Bone::Hip,
        Bone::Spine,
        Bone::Chest,
        Bone::Neck,
        Bone::Head,
        Bone::Jaw,
        Bone::ShoulderL,
        Bone::ShoulderR,
    ];

    pub fn parent(self) -> Option<Bone> {
        match self {
            Bone::Hip => None,
            Bone::Spine => Some(Bone::Hip),
            Bone::Chest => Some(Bone::Spine),
            Bone::Neck => Some(Bone::Chest),
            Bone::Head => Some(Bone::Neck),
            Bone::Jaw => Some(Bone::Head),
            Bone::ShoulderL => Some(Bone::Chest),
            Bone::ShoulderR => Some(Bone::Chest),
        }
    }

    pub fn from_index(i: u8) -> Option<Bone> {
        Bone::ALL.get(i as usize).copied()
    }
}

/// Detected placement of one bone in normalized space.
#[derive(Debug, Clone, Copy)]
pub struct BoneSite {
    pub bone: Bone,
    /// rotation pivot
    pub centroid: [f32; 3],
    /// regional spread, stddev-based with a per-bone floor
    pub radius: f32,
}

#[derive(Debug, Clone)]
pub struct Skeleton {
    pub sites: [BoneSite; NUM_BONES],
}

/// Per-bone local Euler rotations for one frame, indexed by bone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPose {
    pub euler: [[f32; 3]; NUM_BONES],
}

/// Stateless per-frame recompute: idle sway plus lip-sync-driven jaw.
pub fn solve_pose(elapsed: f32, lip_sync: f32) -> LocalPose {
    use std::f32::consts::TAU;
    let mut pose = LocalPose::default();
    pose.euler[Bone::Chest as usize][0] =
        CHEST_SWAY_AMPLITUDE * (elapsed * TAU / BREATHING_PERIOD).sin();
    pose.euler[Bone::Head as usize][0] =
        HEAD_SWAY_AMPLITUDE * (elapsed * TAU / HEAD_SWAY_PERIOD_PITCH).sin();
    pose.euler[Bone::Head as usize][1] =
        HEAD_SWAY_AMPLITUDE * (elapsed * TAU / HEAD_SWAY_PERIOD_YAW).sin();
    pose.euler[Bone::Jaw as usize][0] = JAW_MAX_ANGLE * lip_sync.clamp(0., 1.);
    pose.euler[Bone::ShoulderL as usize][2] = SHOULDER_DROP_ANGLE;
    pose.euler[Bone::ShoulderR as usize][2] = -SHOULDER_DROP_ANGLE;
    pose
}

/// Flatten the hierarchy into `MAX_BONE_SLOTS` column-major 4x4 matrices.
///
/// Each local transform rotates around the bone's own detected pivot
/// (`T(pivot) * R * T(-pivot)`); globals compose parent-first in the static
/// topological order.
pub fn bone_matrices(skeleton: &Skeleton, pose: &LocalPose) -> Vec<f32> {
    let mut globals = [nalgebra::Matrix4::<f32>::identity(); NUM_BONES];
    for bone in Bone::ALL {
        let i = bone as usize;
        let site = &skeleton.sites[i];
        let e = pose.euler[i];
        let pivot =
            nalgebra::Translation3::new(site.centroid[0], site.centroid[1], site.centroid[2]);
        let rot = nalgebra::Rotation3::from_euler_angles(e[0], e[1], e[2]);
        let local = pivot.to_homogeneous() * rot.to_homogeneous() * pivot.inverse().to_homogeneous();
        globals[i] = match bone.parent() {
            Some(parent) => globals[parent as usize] * local,
            None => local,
        };
    }
    let mut table = vec![0f32; MAX_BONE_SLOTS * 16];
    let identity = nalgebra::Matrix4::<f32>::identity();
    for i_slot in 0..MAX_BONE_SLOTS {
        let m = if i_slot < NUM_BONES {
            &globals[i_slot]
        } else {
            &identity
        };
        table[i_slot * 16..(i_slot + 1) * 16].copy_from_slice(m.as_slice());
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::transform_affine;

    fn test_skeleton() -> Skeleton {
        let mut sites = [BoneSite {
            bone: Bone::Hip,
            centroid: [0., 0., 0.],
            radius: 0.1,
        }; NUM_BONES];
        let heights = [0.95, 1.15, 1.35, 1.5, 1.6, 1.55, 1.42, 1.42];
        for bone in Bone::ALL {
            let i = bone as usize;
            sites[i].bone = bone;
            sites[i].centroid = [0., heights[i], 0.];
        }
        sites[Bone::ShoulderL as usize].centroid[0] = 0.2;
        sites[Bone::ShoulderR as usize].centroid[0] = -0.2;
        Skeleton { sites }
    }

    fn slot(table: &[f32], bone: Bone) -> &[f32; 16] {
        arrayref::array_ref![table, bone as usize * 16, 16]
    }

    #[test]
    fn test_jaw_follows_lip_sync() {
        let pose = solve_pose(0., 1.0);
        assert!((pose.euler[Bone::Jaw as usize][0] - JAW_MAX_ANGLE).abs() < 1.0e-6);
        let pose = solve_pose(0., 0.0);
        assert!(pose.euler[Bone::Jaw as usize][0].abs() < 1.0e-6);
        // out-of-range input clamps instead of over-rotating
        let pose = solve_pose(0., 3.0);
        assert!((pose.euler[Bone::Jaw as usize][0] - JAW_MAX_ANGLE).abs() < 1.0e-6);
    }

    #[test]
    fn test_root_is_identity() {
        let skeleton = test_skeleton();
        let table = bone_matrices(&skeleton, &solve_pose(1.2, 0.7));
        let hip = slot(&table, Bone::Hip);
        let p = transform_affine(hip, &[0.3, 0.4, 0.5]);
        assert!((p[0] - 0.3).abs() < 1.0e-6);
        assert!((p[1] - 0.4).abs() < 1.0e-6);
        assert!((p[2] - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn test_rotation_is_pivot_relative() {
        let skeleton = test_skeleton();
        let table = bone_matrices(&skeleton, &solve_pose(0., 1.0));
        let jaw = slot(&table, Bone::Jaw);
        let pivot = skeleton.sites[Bone::Jaw as usize].centroid;
        let p = transform_affine(jaw, &pivot);
        for i in 0..3 {
            assert!((p[i] - pivot[i]).abs() < 1.0e-5);
        }
    }

    #[test]
    fn test_unused_slots_stay_identity() {
        let skeleton = test_skeleton();
        let table = bone_matrices(&skeleton, &solve_pose(0.5, 0.5));
        assert_eq!(table.len(), MAX_BONE_SLOTS * 16);
        let m = arrayref::array_ref![table, 63 * 16, 16];
        let p = transform_affine(m, &[1., 2., 3.]);
        assert_eq!(p, [1., 2., 3.]);
    }

    #[test]
    fn test_chest_sway_reaches_head() {
        let skeleton = test_skeleton();
        // pick a time where the chest sway is nonzero
        let table = bone_matrices(&skeleton, &solve_pose(1.0, 0.));
        let head = slot(&table, Bone::Head);
        let head_pivot = skeleton.sites[Bone::Head as usize].centroid;
        let p = transform_affine(head, &head_pivot);
        // head pivot is displaced by the chest rotation upstream
        let moved = (p[1] - head_pivot[1]).abs() + (p[2] - head_pivot[2]).abs();
        assert!(moved > 1.0e-5);
    }
}
