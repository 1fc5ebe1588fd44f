//! Skinned gaussian splat rendering of per-point feature channels.
//!
//! The cloud owns every per-point attribute the render passes need:
//! positions, single-bone rig, logit opacity, log scale, the DC color term
//! and a 32-channel latent vector grouped as 8 tiles of 4 channels. One tile
//! is active at a time; the compositing loop swaps tiles between passes
//! because a render target carries at most 4 channels.

use crate::camera::{mult_vec3_2x3, transform_affine, transform_homogeneous, transform_ndc2pix, CameraMats};
use crate::io_ply::PointCloud;
use crate::rig::Rig;
use crate::skeleton::MAX_BONE_SLOTS;

pub const NUM_LATENT_CHANNELS: usize = 32;
pub const NUM_LATENT_TILES: usize = 8;
pub const TILE_CHANNELS: usize = 4;

/// Gaussian sprite falloff width in normalized sprite coordinates.
pub const SPLAT_SIGMA: f32 = 0.25;
const MIN_RADIUS_PIX: f32 = 1.0;
const MAX_RADIUS_PIX: f32 = 64.0;
/// World-space radius clamp before projection, in normalized body units.
const MAX_RADIUS_WORLD: f32 = 0.1;

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub struct SplatCloud {
    pub num_points: usize,
    pnt2xyz: Vec<f32>,
    pnt2bone: Vec<u8>,
    pnt2weight: Vec<f32>,
    pnt2opacity: Vec<f32>,
    pnt2scale: Vec<f32>,
    pnt2rgbdc: Vec<f32>,
    pnt2latent: Vec<f32>,
    active_tile: usize,
}

impl SplatCloud {
    /// Take ownership of a calibrated cloud and its rig.
    pub fn new(cloud: PointCloud, rig: &Rig) -> Self {
        let num_points = cloud.num_points;
        assert_eq!(rig.pnt2bone.len(), num_points);
        SplatCloud {
            num_points,
            pnt2xyz: cloud.positions,
            pnt2bone: rig.pnt2bone.clone(),
            pnt2weight: rig.pnt2weight.clone(),
            pnt2opacity: cloud.opacities,
            pnt2scale: cloud.log_scales,
            pnt2rgbdc: cloud.colors_dc,
            pnt2latent: vec![0f32; num_points * NUM_LATENT_CHANNELS],
            active_tile: 0,
        }
    }

    pub fn active_tile(&self) -> usize {
        self.active_tile
    }

    /// Select which 4-channel latent slice the next pass renders.
    /// Out-of-range indices are rejected and leave the prior tile active.
    pub fn set_latent_tile(&mut self, i_tile: usize) -> anyhow::Result<()> {
        if i_tile >= NUM_LATENT_TILES {
            log::error!(
                "latent tile index {} out of range (0..{}); keeping tile {}",
                i_tile,
                NUM_LATENT_TILES,
                self.active_tile
            );
            anyhow::bail!("latent tile index {} out of range", i_tile);
        }
        self.active_tile = i_tile;
        Ok(())
    }

    /// Install per-point latent features produced by the external decoder.
    pub fn set_latents(&mut self, pnt2latent: Vec<f32>) -> anyhow::Result<()> {
        anyhow::ensure!(
            pnt2latent.len() == self.num_points * NUM_LATENT_CHANNELS,
            "latent buffer has {} floats, expected {}",
            pnt2latent.len(),
            self.num_points * NUM_LATENT_CHANNELS
        );
        self.pnt2latent = pnt2latent;
        Ok(())
    }

    /// Seed every tile from the DC color term so the render passes produce
    /// something visible before the external decoder has supplied features.
    pub fn seed_latents_from_colors(&mut self) {
        for i_pnt in 0..self.num_points {
            let rgb = arrayref::array_ref![self.pnt2rgbdc, i_pnt * 3, 3];
            for i_tile in 0..NUM_LATENT_TILES {
                let base = i_pnt * NUM_LATENT_CHANNELS + i_tile * TILE_CHANNELS;
                self.pnt2latent[base] = rgb[0];
                self.pnt2latent[base + 1] = rgb[1];
                self.pnt2latent[base + 2] = rgb[2];
                self.pnt2latent[base + 3] = 1.0;
            }
        }
    }

    pub fn rgb_dc(&self) -> &[f32] {
        &self.pnt2rgbdc
    }

    /// Linear blend skinning with the single-bone rig: each position is
    /// transformed by its bone's matrix scaled by the (unit) weight.
    pub fn skin_positions(&self, bone_mats: &[f32]) -> Vec<f32> {
        assert_eq!(bone_mats.len(), MAX_BONE_SLOTS * 16);
        let mut skinned = vec![0f32; self.num_points * 3];
        for i_pnt in 0..self.num_points {
            let p = arrayref::array_ref![self.pnt2xyz, i_pnt * 3, 3];
            let i_bone = self.pnt2bone[i_pnt] as usize;
            let w = self.pnt2weight[i_pnt];
            let m = arrayref::array_ref![bone_mats, i_bone * 16, 16];
            let q = transform_affine(m, p);
            skinned[i_pnt * 3] = q[0] * w;
            skinned[i_pnt * 3 + 1] = q[1] * w;
            skinned[i_pnt * 3 + 2] = q[2] * w;
        }
        skinned
    }

    /// Project skinned points to pixel-space splats carrying the active
    /// latent tile. Points behind the camera are dropped here; NDC-z
    /// clipping happens in the rasterizer.
    pub fn project(&self, skinned: &[f32], cams: &CameraMats) -> Vec<SplatPix> {
        assert_eq!(skinned.len(), self.num_points * 3);
        let transform_ndc2pix = transform_ndc2pix(cams.img_shape);
        let mut splats = Vec::<SplatPix>::with_capacity(self.num_points);
        for i_pnt in 0..self.num_points {
            let pos_world = arrayref::array_ref![skinned, i_pnt * 3, 3];
            let Some(ndc) = transform_homogeneous(&cams.world2ndc, pos_world) else {
                continue;
            };
            let pos_view = transform_affine(&cams.world2view, pos_world);
            let depth = -pos_view[2];
            if depth <= f32::EPSILON {
                continue;
            }
            let pos_pix = mult_vec3_2x3(&transform_ndc2pix, &[ndc[0], ndc[1], 1.0]);
            let scales = arrayref::array_ref![self.pnt2scale, i_pnt * 3, 3];
            let rad_world = ((scales[0].exp() + scales[1].exp() + scales[2].exp()) / 3.0)
                .min(MAX_RADIUS_WORLD);
            let rad_pix =
                (rad_world * cams.focal_y_pix / depth).clamp(MIN_RADIUS_PIX, MAX_RADIUS_PIX);
            let base = i_pnt * NUM_LATENT_CHANNELS + self.active_tile * TILE_CHANNELS;
            let rgba = *arrayref::array_ref![self.pnt2latent, base, TILE_CHANNELS];
            splats.push(SplatPix {
                pos_pix,
                rad_pix,
                ndc_z: ndc[2],
                alpha: sigmoid(self.pnt2opacity[i_pnt]),
                rgba,
            });
        }
        splats
    }
}

/// One point projected to screen space for a single pass.
#[derive(Debug, Clone, Copy)]
pub struct SplatPix {
    pub pos_pix: [f32; 2],
    pub rad_pix: f32,
    pub ndc_z: f32,
    pub alpha: f32,
    pub rgba: [f32; TILE_CHANNELS],
}

/// Accumulate splats into a `TILE_CHANNELS`-deep float target.
///
/// Each splat is a 2D gaussian sprite cut off at its pixel radius, its
/// channel data premultiplied by opacity and summed without depth sorting.
/// The unsorted additive accumulation is the accepted approximation for
/// point-splat rendering here.
pub fn rasterize_splats(splats: &[SplatPix], img_shape: (usize, usize)) -> Vec<f32> {
    let mut img_data = vec![0f32; img_shape.0 * img_shape.1 * TILE_CHANNELS];
    // sigma=0.25 in normalized sprite coords where the cutoff radius is 0.5:
    // exp(-d^2 / (2 sigma^2)) becomes exp(-2 dist^2 / rad^2) in pixels
    let falloff = -0.5 / (SPLAT_SIGMA * SPLAT_SIGMA);
    for splat in splats {
        if splat.ndc_z <= -1f32 || splat.ndc_z >= 1f32 {
            continue;
        }
        let [cx, cy] = splat.pos_pix;
        let rad = splat.rad_pix;
        let ix0 = ((cx - rad).floor().max(0.) as usize).min(img_shape.0);
        let ix1 = (((cx + rad).ceil() as i64).max(0) as usize).min(img_shape.0);
        let iy0 = ((cy - rad).floor().max(0.) as usize).min(img_shape.1);
        let iy1 = (((cy + rad).ceil() as i64).max(0) as usize).min(img_shape.1);
        for (ih, iw) in itertools::iproduct!(iy0..iy1, ix0..ix1) {
            let dx = iw as f32 + 0.5 - cx;
            let dy = ih as f32 + 0.5 - cy;
            let dist2 = dx * dx + dy * dy;
            if dist2 > rad * rad {
                continue;
            }
            // normalized sprite coordinate, cutoff 0.5 at the pixel radius
            let d_norm2 = dist2 / (4.0 * rad * rad);
            let e = (falloff * d_norm2).exp() * splat.alpha;
            let i_pix = (ih * img_shape.0 + iw) * TILE_CHANNELS;
            for c in 0..TILE_CHANNELS {
                img_data[i_pix + c] += splat.rgba[c] * e;
            }
        }
    }
    img_data
}

/// Depth-sorted single-pixel debug draw of the DC colors, for eyeballing a
/// rig without the neural path.
pub fn draw_pix_rgb(
    skinned: &[f32],
    pnt2rgb: &[f32],
    cams: &CameraMats,
) -> Vec<f32> {
    let img_shape = cams.img_shape;
    let num_pnt = skinned.len() / 3;
    let transform_ndc2pix = transform_ndc2pix(img_shape);
    let mut pnt2ndc = vec![[0f32; 3]; num_pnt];
    for i_pnt in 0..num_pnt {
        let p = arrayref::array_ref![skinned, i_pnt * 3, 3];
        pnt2ndc[i_pnt] = transform_homogeneous(&cams.world2ndc, p).unwrap_or([0., 0., 2.]);
    }
    let idx2pnt = {
        let mut idx2pnt: Vec<usize> = (0..num_pnt).collect();
        idx2pnt.sort_by(|&i, &j| {
            let zi = pnt2ndc[i][2] + 1f32;
            let zj = pnt2ndc[j][2] + 1f32;
            zi.partial_cmp(&zj).unwrap()
        });
        idx2pnt
    };
    let mut img_data = vec![[0f32, 0f32, 0f32]; img_shape.0 * img_shape.1];
    // draw back to front so near points overwrite far ones
    for &i_pnt in idx2pnt.iter().rev() {
        let ndc = &pnt2ndc[i_pnt];
        if ndc[2] <= -1f32 || ndc[2] >= 1f32 {
            continue;
        }
        let r0 = mult_vec3_2x3(&transform_ndc2pix, &[ndc[0], ndc[1], 1f32]);
        if r0[0] < 0f32 || r0[0] >= img_shape.0 as f32 {
            continue;
        }
        if r0[1] < 0f32 || r0[1] >= img_shape.1 as f32 {
            continue;
        }
        let ix = r0[0] as usize;
        let iy = r0[1] as usize;
        let rgb = arrayref::array_ref![pnt2rgb, i_pnt * 3, 3];
        let i_pix = iy * img_shape.0 + ix;
        img_data[i_pix][0] = rgb[0];
        img_data[i_pix][1] = rgb[1];
        img_data[i_pix][2] = rgb[2];
    }
    use ::slice_of_array::SliceFlatExt; // for flat
    img_data.flat().to_vec()
}
