//! Load a gaussian avatar PLY, rig it, run a few animation ticks and write
//! the debug draw plus the displayed frame as PNGs under target/.

use gsavatar_core::display::{write_png_from_float_image_rgb, GridMeanEncoder};
use gsavatar_core::refine::{ChannelPreviewRefiner, REFINED_RES};
use gsavatar_core::session::{AssetPaths, AvatarSession};
use gsavatar_core::skeleton::{bone_matrices, solve_pose};
use gsavatar_core::splat_feature::draw_pix_rgb;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let file_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "asset/avatar.ply".to_string());

    let mut session = AvatarSession::new(
        Box::new(ChannelPreviewRefiner),
        Box::new(GridMeanEncoder { grid: 8 }),
    );
    {
        let now = std::time::Instant::now();
        session.load_assets(&AssetPaths {
            point_cloud: file_path.into(),
            ..Default::default()
        })?;
        println!("   Elapsed load_assets: {:.2?}", now.elapsed());
    }

    // a short mouth-opening sweep
    for (i_frame, lip_sync) in [0.0f32, 0.4, 1.0].into_iter().enumerate() {
        session.update_lip_sync(lip_sync);
        let now = std::time::Instant::now();
        session.tick(i_frame as f32 / 30.)?;
        println!("   Elapsed tick {}: {:.2?}", i_frame, now.elapsed());
    }

    if let Some(frame) = session.displayed_frame() {
        write_png_from_float_image_rgb(
            "target/gsavatar__refined.png",
            &(REFINED_RES, REFINED_RES),
            frame,
        )?;
    }

    // depth-sorted debug draw of the DC colors, mouth open
    let skeleton = session.skeleton().expect("session is ready").clone();
    let cams = session.camera().expect("session is ready").clone();
    let mats = bone_matrices(&skeleton, &solve_pose(0.1, 1.0));
    let splats = session.splats_mut().expect("session is ready");
    let skinned = splats.skin_positions(&mats);
    let img_data = draw_pix_rgb(&skinned, splats.rgb_dc(), &cams);
    write_png_from_float_image_rgb("target/gsavatar__debug_pix.png", &cams.img_shape, &img_data)?;
    Ok(())
}
