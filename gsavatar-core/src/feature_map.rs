//! Assembly of the 32-channel coarse feature map from 8 splat passes.

use crate::camera::CameraMats;
use crate::splat_feature::{
    rasterize_splats, SplatCloud, NUM_LATENT_CHANNELS, NUM_LATENT_TILES, TILE_CHANNELS,
};

/// Offscreen render target resolution per pass.
pub const FEATURE_MAP_RES: usize = 256;

/// Channel-major `[channel][row][col]` float tensor, 32 x 256 x 256.
/// Ephemeral per-frame buffer.
pub struct CoarseFeatureMap {
    data: Vec<f32>,
}

impl CoarseFeatureMap {
    pub fn zeros() -> Self {
        CoarseFeatureMap {
            data: vec![0f32; NUM_LATENT_CHANNELS * FEATURE_MAP_RES * FEATURE_MAP_RES],
        }
    }

    /// Scatter one pass's interleaved RGBA target into the tile's four
    /// channel planes.
    pub fn write_pass(&mut self, i_tile: usize, target: &[f32]) {
        assert!(i_tile < NUM_LATENT_TILES);
        assert_eq!(target.len(), FEATURE_MAP_RES * FEATURE_MAP_RES * TILE_CHANNELS);
        let plane = FEATURE_MAP_RES * FEATURE_MAP_RES;
        for i_pix in 0..plane {
            for c in 0..TILE_CHANNELS {
                self.data[(i_tile * TILE_CHANNELS + c) * plane + i_pix] =
                    target[i_pix * TILE_CHANNELS + c];
            }
        }
    }

    pub fn channel(&self, c: usize) -> &[f32] {
        assert!(c < NUM_LATENT_CHANNELS);
        let plane = FEATURE_MAP_RES * FEATURE_MAP_RES;
        &self.data[c * plane..(c + 1) * plane]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Run the 8 sequential latent-tile passes over the skinned cloud and
/// assemble the coarse feature map.
pub fn render_coarse_feature_map(
    cloud: &mut SplatCloud,
    skinned: &[f32],
    cams: &CameraMats,
) -> anyhow::Result<CoarseFeatureMap> {
    anyhow::ensure!(
        cams.img_shape == (FEATURE_MAP_RES, FEATURE_MAP_RES),
        "feature passes render at {res}x{res}, camera is set up for {}x{}",
        cams.img_shape.0,
        cams.img_shape.1,
        res = FEATURE_MAP_RES,
    );
    let mut map = CoarseFeatureMap::zeros();
    for i_tile in 0..NUM_LATENT_TILES {
        cloud.set_latent_tile(i_tile)?;
        let splats = cloud.project(skinned, cams);
        let target = rasterize_splats(&splats, cams.img_shape);
        map.write_pass(i_tile, &target);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_pass_lands_in_tile_channels() {
        let mut map = CoarseFeatureMap::zeros();
        let plane = FEATURE_MAP_RES * FEATURE_MAP_RES;
        let mut target = vec![0f32; plane * TILE_CHANNELS];
        // pixel 7 gets a distinct value per channel
        for c in 0..TILE_CHANNELS {
            target[7 * TILE_CHANNELS + c] = (c + 1) as f32;
        }
        map.write_pass(2, &target);
        for c in 0..TILE_CHANNELS {
            assert_eq!(map.channel(2 * TILE_CHANNELS + c)[7], (c + 1) as f32);
        }
        // other tiles untouched
        assert!(map.channel(0).iter().all(|&v| v == 0.));
        assert!(map.channel(31).iter().all(|&v| v == 0.));
    }
}
