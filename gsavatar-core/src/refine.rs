//! Seam to the external neural refiner and the display normalization that
//! follows it.
//!
//! The refiner itself is an external numerical transform (coarse feature map
//! plus identity embedding in, RGB image out); nothing here knows about model
//! internals. Refinement is far slower than the 8-pass raster loop, so the
//! session invokes it once per asset load and redisplays the cached result.

use crate::feature_map::{CoarseFeatureMap, FEATURE_MAP_RES};

/// Refined output resolution.
pub const REFINED_RES: usize = 512;

/// Interleaved RGB float image, `REFINED_RES` square.
#[derive(Debug, Clone)]
pub struct RefinedImage {
    pub data: Vec<f32>,
}

impl RefinedImage {
    pub fn filled(value: f32) -> Self {
        RefinedImage {
            data: vec![value; REFINED_RES * REFINED_RES * 3],
        }
    }
}

pub trait Refiner {
    fn refine(&self, coarse: &CoarseFeatureMap, identity: &[f32]) -> anyhow::Result<RefinedImage>;
}

/// Constant-output refiner for pipeline tests and wiring checks.
pub struct FlatRefiner {
    pub value: f32,
}

impl Refiner for FlatRefiner {
    fn refine(&self, _coarse: &CoarseFeatureMap, _identity: &[f32]) -> anyhow::Result<RefinedImage> {
        Ok(RefinedImage::filled(self.value))
    }
}

/// Model-free stand-in that upsamples the first pass's RGB channels 2x, so
/// demos produce a viewable frame without the external model.
pub struct ChannelPreviewRefiner;

impl Refiner for ChannelPreviewRefiner {
    fn refine(&self, coarse: &CoarseFeatureMap, _identity: &[f32]) -> anyhow::Result<RefinedImage> {
        let mut img = RefinedImage::filled(0.);
        for c in 0..3 {
            let plane = coarse.channel(c);
            for ih in 0..REFINED_RES {
                for iw in 0..REFINED_RES {
                    let v = plane[(ih / 2) * FEATURE_MAP_RES + iw / 2];
                    img.data[(ih * REFINED_RES + iw) * 3 + c] = v;
                }
            }
        }
        Ok(img)
    }
}

/// One-time dynamic-range normalization plus a brightness multiplier.
///
/// The range is captured from the first successfully refined frame and then
/// reused, so redisplays are stable. A flat first frame keeps the identity
/// range instead of dividing by a vanishing span.
pub struct DisplayNormalizer {
    captured_range: Option<(f32, f32)>,
    pub brightness: f32,
}

impl DisplayNormalizer {
    pub fn new(brightness: f32) -> Self {
        DisplayNormalizer {
            captured_range: None,
            brightness,
        }
    }

    pub fn reset(&mut self) {
        self.captured_range = None;
    }

    /// Map a refined image into `[0, 1]` display values.
    pub fn normalize(&mut self, img: &RefinedImage) -> Vec<f32> {
        let (lo, hi) = *self.captured_range.get_or_insert_with(|| {
            let mut lo = f32::MAX;
            let mut hi = f32::MIN;
            for &v in &img.data {
                lo = lo.min(v);
                hi = hi.max(v);
            }
            if hi - lo < 1.0e-6 {
                (0., 1.)
            } else {
                (lo, hi)
            }
        });
        img.data
            .iter()
            .map(|&v| (((v - lo) / (hi - lo)) * self.brightness).clamp(0., 1.))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_refined_frame_displays_mid_gray() {
        let coarse = CoarseFeatureMap::zeros();
        let refined = FlatRefiner { value: 0.5 }.refine(&coarse, &[]).unwrap();
        let mut display = DisplayNormalizer::new(1.0);
        let frame = display.normalize(&refined);
        assert_eq!(frame.len(), REFINED_RES * REFINED_RES * 3);
        assert!(frame.iter().all(|&v| (v - 0.5).abs() < 1.0e-6));
    }

    #[test]
    fn test_range_is_captured_once() {
        let mut display = DisplayNormalizer::new(1.0);
        let mut first = RefinedImage::filled(0.);
        first.data[0] = 2.0;
        let frame = display.normalize(&first);
        assert!((frame[0] - 1.0).abs() < 1.0e-6);
        assert!(frame[1].abs() < 1.0e-6);
        // the captured range persists for later frames
        let second = RefinedImage::filled(2.0);
        let frame = display.normalize(&second);
        assert!(frame.iter().all(|&v| (v - 1.0).abs() < 1.0e-6));
    }

    #[test]
    fn test_brightness_multiplier() {
        let mut display = DisplayNormalizer::new(0.5);
        let mut img = RefinedImage::filled(0.);
        img.data[0] = 1.0;
        let frame = display.normalize(&img);
        assert!((frame[0] - 0.5).abs() < 1.0e-6);
    }
}
