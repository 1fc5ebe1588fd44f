//! Automatic rigging of a normalized point cloud onto the fixed skeleton.
//!
//! Two passes. First, anatomical bone sites are detected from
//! fraction-of-height bands (jaw and shoulders get dedicated treatment).
//! Second, a synthetic template cloud is generated around the detected sites
//! and every real point is assigned the bone of its nearest template point.
//! The template cloud only lives for the duration of this pass.
//!
//! All thresholds are height-relative so the same bands work for any
//! calibrated cloud.

use crate::calibration::Aabb3;
use crate::skeleton::{Bone, BoneSite, NUM_BONES};
use anyhow::Context;
use num_traits::AsPrimitive;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// (bone, band bottom, band top, radius floor), bands as fractions of height
const HEIGHT_BANDS: [(Bone, f32, f32, f32); 5] = [
    (Bone::Hip, 0.50, 0.65, 0.12),
    (Bone::Spine, 0.62, 0.76, 0.10),
    (Bone::Chest, 0.75, 0.88, 0.10),
    (Bone::Neck, 0.86, 0.93, 0.05),
    (Bone::Head, 0.90, 1.00, 0.08),
];

const JAW_BAND_ABOVE_NECK: f32 = 0.08;
const JAW_LOWEST_FRACTION: f32 = 0.20;
const JAW_RADIUS_FLOOR: f32 = 0.03;
const MIN_JAW_CANDIDATES: usize = 8;

const SHOULDER_OUTER_FRACTION: f32 = 0.20;
const SHOULDER_RADIUS_FLOOR: f32 = 0.05;
const MIN_SHOULDER_CANDIDATES: usize = 4;

const JAW_TEMPLATE_SAMPLES: usize = 96;
const FAN_TEMPLATE_SAMPLES: usize = 32;

const GRID_RES: usize = 8;

/// Synthetic per-bone sample cloud used only while assigning bones.
pub struct TemplateCloud {
    pub xyz: Vec<f32>,
    pub tpl2bone: Vec<u8>,
}

/// Precomputed nearest-template cache, fetched alongside the point cloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexMapping {
    pub ply_vertex_count: usize,
    pub template_vertex_count: usize,
    pub mapping: Vec<u32>,
}

pub fn load_vertex_mapping<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<VertexMapping> {
    let file = std::fs::File::open(&path)
        .with_context(|| format!("cannot read vertex mapping {:?}", path.as_ref()))?;
    let mapping = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok(mapping)
}

pub fn save_vertex_mapping<P: AsRef<std::path::Path>>(
    path: P,
    mapping: &VertexMapping,
) -> anyhow::Result<()> {
    let file = std::fs::File::create(&path)
        .with_context(|| format!("cannot write vertex mapping {:?}", path.as_ref()))?;
    serde_json::to_writer(std::io::BufWriter::new(file), mapping)?;
    Ok(())
}

/// Result of the one-time rigging pass: one bone per point, weight 1.0.
#[derive(Debug, Clone)]
pub struct Rig {
    pub sites: [BoneSite; NUM_BONES],
    /// nearest template-vertex index per point (the cache file payload)
    pub mapping: Vec<u32>,
    pub pnt2bone: Vec<u8>,
    pub pnt2weight: Vec<f32>,
}

/// Sum in sorted order so the result does not depend on point order; bone
/// assignments must be reproducible under permutation of the input cloud.
fn stable_sum(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    values.iter().sum()
}

fn centroid_radius(xyz: &[f32], idxs: &[usize]) -> Option<([f32; 3], f32)> {
    if idxs.is_empty() {
        return None;
    }
    let n = idxs.len() as f64;
    let mut c = [0f64; 3];
    for (k, c_k) in c.iter_mut().enumerate() {
        let mut vals: Vec<f64> = idxs.iter().map(|&i| xyz[i * 3 + k] as f64).collect();
        *c_k = stable_sum(&mut vals) / n;
    }
    let mut d2s: Vec<f64> = idxs
        .iter()
        .map(|&i| {
            let dx = xyz[i * 3] as f64 - c[0];
            let dy = xyz[i * 3 + 1] as f64 - c[1];
            let dz = xyz[i * 3 + 2] as f64 - c[2];
            dx * dx + dy * dy + dz * dz
        })
        .collect();
    let radius = (stable_sum(&mut d2s) / n).sqrt() as f32;
    Some(([c[0] as f32, c[1] as f32, c[2] as f32], radius))
}

fn band_indices(xyz: &[f32], y0: f32, y1: f32) -> Vec<usize> {
    (0..xyz.len() / 3)
        .filter(|&i| {
            let y = xyz[i * 3 + 1];
            y >= y0 && y <= y1
        })
        .collect()
}

/// kth-smallest threshold so that selection by value stays independent of
/// input point order.
fn lower_quantile_threshold(values: &mut [f32], fraction: f32) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let k = ((values.len() as f32 * fraction).ceil() as usize).max(1);
    values[k - 1]
}

fn detect_jaw(xyz: &[f32], height: f32, neck: &BoneSite) -> BoneSite {
    let x_half_width = (0.6 * neck.radius).max(0.04);
    let candidates: Vec<usize> = (0..xyz.len() / 3)
        .filter(|&i| {
            let p = arrayref::array_ref![xyz, i * 3, 3];
            p[1] > neck.centroid[1]
                && p[1] <= neck.centroid[1] + JAW_BAND_ABOVE_NECK * height
                && p[2] > neck.centroid[2]
                && (p[0] - neck.centroid[0]).abs() <= x_half_width
        })
        .collect();
    if candidates.len() >= MIN_JAW_CANDIDATES {
        let mut ys: Vec<f32> = candidates.iter().map(|&i| xyz[i * 3 + 1]).collect();
        let y_thr = lower_quantile_threshold(&mut ys, JAW_LOWEST_FRACTION);
        let cluster: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| xyz[i * 3 + 1] <= y_thr)
            .collect();
        if let Some((centroid, radius)) = centroid_radius(xyz, &cluster) {
            return BoneSite {
                bone: Bone::Jaw,
                centroid,
                radius: radius.max(JAW_RADIUS_FLOOR),
            };
        }
    }
    // documented fallback, not silent: place the jaw at a fixed offset in
    // front of and slightly above the neck
    log::warn!(
        "jaw detection degenerate ({} candidates); falling back to fixed neck offset",
        candidates.len()
    );
    BoneSite {
        bone: Bone::Jaw,
        centroid: [
            neck.centroid[0],
            neck.centroid[1] + 0.04 * height,
            neck.centroid[2] + 0.03 * height,
        ],
        radius: JAW_RADIUS_FLOOR,
    }
}

fn detect_shoulders(xyz: &[f32], height: f32, chest: &BoneSite) -> (BoneSite, BoneSite) {
    let &(_, y0, y1, _) = HEIGHT_BANDS.iter().find(|t| t.0 == Bone::Chest).unwrap();
    let band = band_indices(xyz, y0 * height, y1 * height);
    let fallback = |side: f32, bone: Bone| {
        log::warn!(
            "shoulder detection degenerate ({} chest points); falling back to chest offset",
            band.len()
        );
        BoneSite {
            bone,
            centroid: [
                chest.centroid[0] + side * 0.15 * height,
                chest.centroid[1] + 0.02 * height,
                chest.centroid[2],
            ],
            radius: SHOULDER_RADIUS_FLOOR,
        }
    };
    if band.len() < MIN_SHOULDER_CANDIDATES {
        return (fallback(1., Bone::ShoulderL), fallback(-1., Bone::ShoulderR));
    }
    let mut xs: Vec<f32> = band.iter().map(|&i| xyz[i * 3]).collect();
    let x_low = lower_quantile_threshold(&mut xs, SHOULDER_OUTER_FRACTION);
    let mut xs_neg: Vec<f32> = band.iter().map(|&i| -xyz[i * 3]).collect();
    let x_high = -lower_quantile_threshold(&mut xs_neg, SHOULDER_OUTER_FRACTION);
    let left: Vec<usize> = band.iter().copied().filter(|&i| xyz[i * 3] >= x_high).collect();
    let right: Vec<usize> = band.iter().copied().filter(|&i| xyz[i * 3] <= x_low).collect();
    let site = |idxs: &[usize], side: f32, bone: Bone| match centroid_radius(xyz, idxs) {
        Some((centroid, radius)) => BoneSite {
            bone,
            centroid,
            radius: radius.max(SHOULDER_RADIUS_FLOOR),
        },
        None => fallback(side, bone),
    };
    (
        site(&left, 1., Bone::ShoulderL),
        site(&right, -1., Bone::ShoulderR),
    )
}

/// Segment the normalized cloud into anatomical regions and compute a
/// centroid and spread per bone.
pub fn detect_bone_sites(xyz: &[f32], height: f32) -> anyhow::Result<[BoneSite; NUM_BONES]> {
    anyhow::ensure!(!xyz.is_empty(), "cannot rig an empty point cloud");
    let mut sites = [BoneSite {
        bone: Bone::Hip,
        centroid: [0f32; 3],
        radius: 0f32,
    }; NUM_BONES];
    for &(bone, y0, y1, radius_floor) in HEIGHT_BANDS.iter() {
        let idxs = band_indices(xyz, y0 * height, y1 * height);
        let site = match centroid_radius(xyz, &idxs) {
            Some((centroid, radius)) => BoneSite {
                bone,
                centroid,
                radius: radius.max(radius_floor),
            },
            None => {
                log::warn!("no points in {:?} band; using band center", bone);
                BoneSite {
                    bone,
                    centroid: [0., 0.5 * (y0 + y1) * height, 0.],
                    radius: radius_floor,
                }
            }
        };
        sites[bone as usize] = site;
    }
    sites[Bone::Jaw as usize] = detect_jaw(xyz, height, &sites[Bone::Neck as usize]);
    let (left, right) = detect_shoulders(xyz, height, &sites[Bone::Chest as usize]);
    sites[Bone::ShoulderL as usize] = left;
    sites[Bone::ShoulderR as usize] = right;
    Ok(sites)
}

/// Generate the synthetic template cloud: a dense front-biased half-shell
/// for the jaw, a coarse partial-sphere fan for every other bone. The rng is
/// seeded so the same sites always yield the same templates.
pub fn synthesize_templates(sites: &[BoneSite; NUM_BONES]) -> TemplateCloud {
    use std::f32::consts::{PI, TAU};
    let mut reng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
    let mut xyz = Vec::<f32>::new();
    let mut tpl2bone = Vec::<u8>::new();
    for bone in Bone::ALL {
        let site = &sites[bone as usize];
        let c = site.centroid;
        let num_samples = if bone == Bone::Jaw {
            JAW_TEMPLATE_SAMPLES
        } else {
            FAN_TEMPLATE_SAMPLES
        };
        for _ in 0..num_samples {
            let (azimuth, elevation, r) = if bone == Bone::Jaw {
                // thin shell restricted to the front (+Z) hemisphere
                (
                    (reng.random::<f32>() - 0.5) * PI,
                    (reng.random::<f32>() - 0.5) * 0.5 * PI,
                    site.radius * (0.9 + 0.1 * reng.random::<f32>()),
                )
            } else {
                (
                    reng.random::<f32>() * TAU,
                    (reng.random::<f32>() - 0.5) * 2. * PI / 3.,
                    site.radius * (0.7 + 0.3 * reng.random::<f32>()),
                )
            };
            xyz.push(c[0] + r * elevation.cos() * azimuth.sin());
            xyz.push(c[1] + r * elevation.sin());
            xyz.push(c[2] + r * elevation.cos() * azimuth.cos());
            tpl2bone.push(bone as u8);
        }
    }
    TemplateCloud { xyz, tpl2bone }
}

#[inline]
fn dist2(p: &[f32; 3], q: &[f32; 3]) -> f32 {
    let dx = p[0] - q[0];
    let dy = p[1] - q[1];
    let dz = p[2] - q[2];
    dx * dx + dy * dy + dz * dz
}

/// Reference O(N*M) nearest-template search. Ties resolve to the smaller
/// template index.
pub fn nearest_template_brute(xyz: &[f32], tpl_xyz: &[f32]) -> Vec<u32> {
    let num_tpl = tpl_xyz.len() / 3;
    (0..xyz.len() / 3)
        .map(|i_pnt| {
            let p = arrayref::array_ref![xyz, i_pnt * 3, 3];
            let mut best = (f32::MAX, 0u32);
            for i_tpl in 0..num_tpl {
                let q = arrayref::array_ref![tpl_xyz, i_tpl * 3, 3];
                let d2 = dist2(p, q);
                if d2 < best.0 {
                    best = (d2, i_tpl as u32);
                }
            }
            best.1
        })
        .collect()
}

/// Bucket template points into a uniform grid, count-then-fill with prefix
/// sums. Generic over the bucket index width.
fn grid_build<INDEX>(
    tpl_xyz: &[f32],
    origin: &[f32; 3],
    cell_size: f32,
    grid_shape: (usize, usize, usize),
) -> (Vec<INDEX>, Vec<INDEX>)
where
    INDEX: num_traits::PrimInt + std::ops::AddAssign<INDEX> + AsPrimitive<usize>,
    usize: AsPrimitive<INDEX>,
{
    let num_cell = grid_shape.0 * grid_shape.1 * grid_shape.2;
    let num_tpl = tpl_xyz.len() / 3;
    let cell_of = |i_tpl: usize| -> usize {
        let p = arrayref::array_ref![tpl_xyz, i_tpl * 3, 3];
        let ix = (((p[0] - origin[0]) / cell_size) as usize).min(grid_shape.0 - 1);
        let iy = (((p[1] - origin[1]) / cell_size) as usize).min(grid_shape.1 - 1);
        let iz = (((p[2] - origin[2]) / cell_size) as usize).min(grid_shape.2 - 1);
        (iz * grid_shape.1 + iy) * grid_shape.0 + ix
    };
    let mut cell2ind = vec![INDEX::zero(); num_cell + 1];
    for i_tpl in 0..num_tpl {
        cell2ind[cell_of(i_tpl) + 1] += INDEX::one();
    }
    for i_cell in 0..num_cell {
        let ind0 = cell2ind[i_cell + 1];
        cell2ind[i_cell + 1] = cell2ind[i_cell] + ind0;
    }
    let mut ind2tpl = vec![INDEX::zero(); num_tpl];
    let mut cursor: Vec<usize> = cell2ind.iter().map(|v| v.as_()).collect();
    for i_tpl in 0..num_tpl {
        let i_cell = cell_of(i_tpl);
        ind2tpl[cursor[i_cell]] = i_tpl.as_();
        cursor[i_cell] += 1;
    }
    (cell2ind, ind2tpl)
}

/// Grid-accelerated nearest-template search. Produces assignments identical
/// to [`nearest_template_brute`], including tie resolution.
pub fn nearest_template_grid(xyz: &[f32], tpl_xyz: &[f32]) -> Vec<u32> {
    let num_tpl = tpl_xyz.len() / 3;
    if num_tpl == 0 {
        return vec![];
    }
    let aabb = Aabb3::from_points(tpl_xyz);
    let size = aabb.size();
    let max_edge = size[0].max(size[1]).max(size[2]);
    if max_edge <= f32::EPSILON {
        return nearest_template_brute(xyz, tpl_xyz);
    }
    let cell_size = max_edge / GRID_RES as f32;
    let grid_shape = (
        ((size[0] / cell_size).ceil() as usize).clamp(1, GRID_RES),
        ((size[1] / cell_size).ceil() as usize).clamp(1, GRID_RES),
        ((size[2] / cell_size).ceil() as usize).clamp(1, GRID_RES),
    );
    let (cell2ind, ind2tpl) = grid_build::<u32>(tpl_xyz, &aabb.min, cell_size, grid_shape);

    let cell_coord = |v: f32, min: f32, n: usize| -> usize {
        if v <= min {
            return 0;
        }
        (((v - min) / cell_size) as usize).min(n - 1)
    };
    (0..xyz.len() / 3)
        .map(|i_pnt| {
            let p = arrayref::array_ref![xyz, i_pnt * 3, 3];
            let cx = cell_coord(p[0], aabb.min[0], grid_shape.0) as i64;
            let cy = cell_coord(p[1], aabb.min[1], grid_shape.1) as i64;
            let cz = cell_coord(p[2], aabb.min[2], grid_shape.2) as i64;
            let max_ring = [
                cx.max(grid_shape.0 as i64 - 1 - cx),
                cy.max(grid_shape.1 as i64 - 1 - cy),
                cz.max(grid_shape.2 as i64 - 1 - cz),
            ]
            .into_iter()
            .max()
            .unwrap();
            let mut best = (f32::MAX, u32::MAX);
            let mut ring = 0i64;
            loop {
                for iz in (cz - ring).max(0)..=(cz + ring).min(grid_shape.2 as i64 - 1) {
                    for iy in (cy - ring).max(0)..=(cy + ring).min(grid_shape.1 as i64 - 1) {
                        for ix in (cx - ring).max(0)..=(cx + ring).min(grid_shape.0 as i64 - 1) {
                            let chebyshev =
                                (ix - cx).abs().max((iy - cy).abs()).max((iz - cz).abs());
                            if chebyshev != ring {
                                continue;
                            }
                            let i_cell = ((iz * grid_shape.1 as i64 + iy) * grid_shape.0 as i64
                                + ix) as usize;
                            let ind0 = cell2ind[i_cell] as usize;
                            let ind1 = cell2ind[i_cell + 1] as usize;
                            for &i_tpl in &ind2tpl[ind0..ind1] {
                                let q = arrayref::array_ref![tpl_xyz, i_tpl as usize * 3, 3];
                                let d2 = dist2(p, q);
                                if d2 < best.0 || (d2 == best.0 && i_tpl < best.1) {
                                    best = (d2, i_tpl);
                                }
                            }
                        }
                    }
                }
                // cells on ring r+1 are at least r cells away from anywhere
                // inside the center cell
                let ring_min_dist = ring as f32 * cell_size;
                if best.1 != u32::MAX && ring_min_dist * ring_min_dist > best.0 {
                    break;
                }
                if ring > max_ring {
                    break;
                }
                ring += 1;
            }
            best.1
        })
        .collect()
}

fn cache_is_valid(cache: &VertexMapping, num_pnt: usize, num_tpl: usize) -> bool {
    cache.ply_vertex_count == num_pnt
        && cache.template_vertex_count == num_tpl
        && cache.mapping.len() == num_pnt
        && cache.mapping.iter().all(|&j| (j as usize) < num_tpl)
}

/// One-time rigging pass over a calibrated cloud. `cache` short-circuits the
/// nearest-template search when its shape matches the asset.
pub fn build_rig(
    xyz: &[f32],
    height: f32,
    cache: Option<&VertexMapping>,
) -> anyhow::Result<Rig> {
    let sites = detect_bone_sites(xyz, height)?;
    let template = synthesize_templates(&sites);
    let num_pnt = xyz.len() / 3;
    let num_tpl = template.xyz.len() / 3;
    let mapping = match cache {
        Some(c) if cache_is_valid(c, num_pnt, num_tpl) => c.mapping.clone(),
        Some(c) => {
            log::warn!(
                "vertex-mapping cache mismatch (cache {}x{}, asset {}x{}); \
                 recomputing nearest templates",
                c.ply_vertex_count,
                c.template_vertex_count,
                num_pnt,
                num_tpl
            );
            nearest_template_grid(xyz, &template.xyz)
        }
        None => {
            log::warn!(
                "no vertex-mapping cache; computing nearest templates at load time \
                 ({} points x {} templates)",
                num_pnt,
                num_tpl
            );
            nearest_template_grid(xyz, &template.xyz)
        }
    };
    let pnt2bone: Vec<u8> = mapping
        .iter()
        .map(|&i_tpl| template.tpl2bone[i_tpl as usize])
        .collect();
    // single-bone rigid assignment, no blending across points
    let pnt2weight = vec![1f32; num_pnt];
    Ok(Rig {
        sites,
        mapping,
        pnt2bone,
        pnt2weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::TARGET_HEIGHT;
    use crate::test_cloud::humanoid_cloud;

    #[test]
    fn test_every_point_gets_one_bone() {
        let xyz = humanoid_cloud();
        let rig = build_rig(&xyz, TARGET_HEIGHT, None).unwrap();
        assert_eq!(rig.pnt2bone.len(), xyz.len() / 3);
        assert_eq!(rig.pnt2weight.len(), xyz.len() / 3);
        assert!(rig.pnt2bone.iter().all(|&b| (b as usize) < NUM_BONES));
        assert!(rig.pnt2weight.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_assignment_is_order_independent() {
        let xyz = humanoid_cloud();
        let num_pnt = xyz.len() / 3;
        // reverse the point order
        let mut permuted = Vec::<f32>::with_capacity(xyz.len());
        for i_pnt in (0..num_pnt).rev() {
            permuted.extend_from_slice(&xyz[i_pnt * 3..i_pnt * 3 + 3]);
        }
        let rig0 = build_rig(&xyz, TARGET_HEIGHT, None).unwrap();
        let rig1 = build_rig(&permuted, TARGET_HEIGHT, None).unwrap();
        for i_pnt in 0..num_pnt {
            assert_eq!(rig0.pnt2bone[i_pnt], rig1.pnt2bone[num_pnt - 1 - i_pnt]);
        }
    }

    #[test]
    fn test_grid_matches_brute_force() {
        let xyz = humanoid_cloud();
        let sites = detect_bone_sites(&xyz, TARGET_HEIGHT).unwrap();
        let template = synthesize_templates(&sites);
        let brute = nearest_template_brute(&xyz, &template.xyz);
        let grid = nearest_template_grid(&xyz, &template.xyz);
        assert_eq!(brute, grid);
    }

    #[test]
    fn test_jaw_fallback_on_degenerate_cloud() {
        // a bare column has no frontal chin points
        let h = TARGET_HEIGHT;
        let mut xyz = Vec::<f32>::new();
        for i in 0..80 {
            let y = h * (i as f32 + 0.5) / 80.;
            xyz.extend_from_slice(&[0.01 * (i % 3) as f32, y, -0.01 * (i % 2) as f32]);
        }
        let sites = detect_bone_sites(&xyz, h).unwrap();
        let neck = &sites[Bone::Neck as usize];
        let jaw = &sites[Bone::Jaw as usize];
        assert!((jaw.centroid[1] - (neck.centroid[1] + 0.04 * h)).abs() < 1.0e-5);
        assert!((jaw.centroid[2] - (neck.centroid[2] + 0.03 * h)).abs() < 1.0e-5);
        assert_eq!(jaw.radius, JAW_RADIUS_FLOOR);
    }

    #[test]
    fn test_shoulders_split_left_right() {
        let xyz = humanoid_cloud();
        let sites = detect_bone_sites(&xyz, TARGET_HEIGHT).unwrap();
        assert!(sites[Bone::ShoulderL as usize].centroid[0] > 0.1);
        assert!(sites[Bone::ShoulderR as usize].centroid[0] < -0.1);
    }

    #[test]
    fn test_mismatched_cache_is_recomputed() {
        let xyz = humanoid_cloud();
        let stale = VertexMapping {
            ply_vertex_count: 3,
            template_vertex_count: 7,
            mapping: vec![0, 1, 2],
        };
        let rig_cached = build_rig(&xyz, TARGET_HEIGHT, Some(&stale)).unwrap();
        let rig_fresh = build_rig(&xyz, TARGET_HEIGHT, None).unwrap();
        assert_eq!(rig_cached.pnt2bone, rig_fresh.pnt2bone);
    }

    #[test]
    fn test_mapping_cache_wire_format() {
        let json = r#"{"plyVertexCount":2,"templateVertexCount":3,"mapping":[2,0]}"#;
        let cache: VertexMapping = serde_json::from_str(json).unwrap();
        assert_eq!(cache.ply_vertex_count, 2);
        assert_eq!(cache.template_vertex_count, 3);
        assert_eq!(cache.mapping, vec![2, 0]);
        let back = serde_json::to_string(&cache).unwrap();
        assert!(back.contains("plyVertexCount"));
    }

    #[test]
    fn test_valid_cache_is_honored() {
        let xyz = humanoid_cloud();
        let sites = detect_bone_sites(&xyz, TARGET_HEIGHT).unwrap();
        let template = synthesize_templates(&sites);
        let rig = build_rig(&xyz, TARGET_HEIGHT, None).unwrap();
        let cache = VertexMapping {
            ply_vertex_count: xyz.len() / 3,
            template_vertex_count: template.xyz.len() / 3,
            mapping: rig.mapping.clone(),
        };
        let rig_cached = build_rig(&xyz, TARGET_HEIGHT, Some(&cache)).unwrap();
        assert_eq!(rig_cached.pnt2bone, rig.pnt2bone);
    }
}
