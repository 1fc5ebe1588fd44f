//! Float-image PNG IO and the seam to the external image encoder.

use anyhow::Context;

/// Write an interleaved RGB float image in `[0, 1]` to a PNG.
pub fn write_png_from_float_image_rgb<P: AsRef<std::path::Path>>(
    path: P,
    img_shape: &(usize, usize),
    img_data: &[f32],
) -> anyhow::Result<()> {
    assert_eq!(img_data.len(), img_shape.0 * img_shape.1 * 3);
    let pixels: Vec<u8> = img_data
        .iter()
        .map(|&v| (v.clamp(0., 1.) * 255.) as u8)
        .collect();
    let img = image::RgbImage::from_raw(img_shape.0 as u32, img_shape.1 as u32, pixels)
        .context("invalid image buffer size")?;
    img.save(&path)
        .with_context(|| format!("cannot write image {:?}", path.as_ref()))?;
    Ok(())
}

/// Load a photograph as interleaved RGB floats in `[0, 1]`.
pub fn read_photo_rgb<P: AsRef<std::path::Path>>(
    path: P,
) -> anyhow::Result<(Vec<f32>, (usize, usize))> {
    let img = image::open(&path)
        .with_context(|| format!("cannot read photograph {:?}", path.as_ref()))?
        .to_rgb8();
    let shape = (img.width() as usize, img.height() as usize);
    let data = img.into_raw().iter().map(|&v| v as f32 / 255.).collect();
    Ok((data, shape))
}

/// External image-encoder seam: a photograph in, a fixed-length identity
/// embedding out. The real encoder is a neural model living outside this
/// crate.
pub trait IdentityEncoder {
    fn encode(&self, rgb: &[f32], img_shape: (usize, usize)) -> anyhow::Result<Vec<f32>>;
}

/// Model-free stand-in: per-cell mean colors over a coarse grid.
pub struct GridMeanEncoder {
    pub grid: usize,
}

impl IdentityEncoder for GridMeanEncoder {
    fn encode(&self, rgb: &[f32], img_shape: (usize, usize)) -> anyhow::Result<Vec<f32>> {
        anyhow::ensure!(
            rgb.len() == img_shape.0 * img_shape.1 * 3,
            "photo buffer has {} floats, expected {}",
            rgb.len(),
            img_shape.0 * img_shape.1 * 3
        );
        anyhow::ensure!(img_shape.0 >= self.grid && img_shape.1 >= self.grid,
            "photo smaller than the {0}x{0} embedding grid", self.grid);
        let mut embedding = vec![0f32; self.grid * self.grid * 3];
        let mut counts = vec![0u32; self.grid * self.grid];
        for ih in 0..img_shape.1 {
            let gy = ih * self.grid / img_shape.1;
            for iw in 0..img_shape.0 {
                let gx = iw * self.grid / img_shape.0;
                let i_cell = gy * self.grid + gx;
                for c in 0..3 {
                    embedding[i_cell * 3 + c] += rgb[(ih * img_shape.0 + iw) * 3 + c];
                }
                counts[i_cell] += 1;
            }
        }
        for i_cell in 0..self.grid * self.grid {
            if counts[i_cell] > 0 {
                for c in 0..3 {
                    embedding[i_cell * 3 + c] /= counts[i_cell] as f32;
                }
            }
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_mean_embedding_shape() {
        let shape = (8, 8);
        let rgb = vec![0.25f32; shape.0 * shape.1 * 3];
        let embedding = GridMeanEncoder { grid: 4 }.encode(&rgb, shape).unwrap();
        assert_eq!(embedding.len(), 4 * 4 * 3);
        assert!(embedding.iter().all(|&v| (v - 0.25).abs() < 1.0e-6));
    }

    #[test]
    fn test_encoder_rejects_bad_buffer() {
        assert!(GridMeanEncoder { grid: 4 }.encode(&[0.1; 5], (8, 8)).is_err());
    }
}
