//! Avatar session: asset loading, live control, and the per-frame tick.
//!
//! All mutable animation state lives here rather than in module globals, so
//! several sessions can coexist and tear down cleanly. The tick is driven by
//! an external render-loop owner with injected elapsed time; nothing in the
//! pipeline schedules itself.

use crate::calibration::{
    frame_camera, normalize_points, shift_log_scales, Calibration, TARGET_HEIGHT,
};
use crate::camera::CameraMats;
use crate::display::{read_photo_rgb, IdentityEncoder};
use crate::feature_map::{render_coarse_feature_map, FEATURE_MAP_RES};
use crate::io_ply::{self, PointCloud};
use crate::refine::{DisplayNormalizer, Refiner};
use crate::rig::{self, build_rig, Rig, VertexMapping};
use crate::skeleton::{bone_matrices, solve_pose, Skeleton};
use crate::splat_feature::SplatCloud;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_FOV_DEG: f32 = 45.0;
const DEFAULT_BRIGHTNESS: f32 = 1.0;
const CAMERA_NEAR: f32 = 0.1;
const CAMERA_FAR: f32 = 50.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Vec3Config {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3Config {
    fn as_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Camera placement fetched alongside the asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfig {
    pub position: Vec3Config,
    pub target: Vec3Config,
    pub fov: f32,
    pub image_width: usize,
    pub image_height: usize,
}

pub fn load_camera_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<CameraConfig> {
    let file = std::fs::File::open(&path)
        .with_context(|| format!("cannot read camera config {:?}", path.as_ref()))?;
    let config = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok(config)
}

/// Everything `load_assets` fetches. Only the point cloud is required.
#[derive(Debug, Clone, Default)]
pub struct AssetPaths {
    pub point_cloud: PathBuf,
    pub source_photo: Option<PathBuf>,
    pub vertex_mapping: Option<PathBuf>,
    pub camera_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Ready,
}

/// Calibrated cloud plus the camera derived for it.
pub struct CalibrationResult {
    pub cloud: PointCloud,
    pub calibration: Calibration,
    pub camera: CameraMats,
}

/// Normalize a parsed cloud and set up the pass camera. With no config the
/// camera frames the normalized bounding box automatically.
pub fn stage_calibrate(
    mut cloud: PointCloud,
    config: Option<&CameraConfig>,
) -> anyhow::Result<CalibrationResult> {
    let calibration = normalize_points(&mut cloud.positions, TARGET_HEIGHT)?;
    shift_log_scales(&mut cloud.log_scales, calibration.scale);
    let img_shape = (FEATURE_MAP_RES, FEATURE_MAP_RES);
    let camera = match config {
        Some(cfg) => CameraMats::new(
            &cfg.position.as_array(),
            &cfg.target.as_array(),
            cfg.fov,
            img_shape,
            CAMERA_NEAR,
            CAMERA_FAR,
        ),
        None => {
            let pose = frame_camera(&calibration.aabb_norm, DEFAULT_FOV_DEG, 1.0);
            CameraMats::new(
                &pose.position,
                &pose.target,
                DEFAULT_FOV_DEG,
                img_shape,
                CAMERA_NEAR,
                CAMERA_FAR,
            )
        }
    };
    Ok(CalibrationResult {
        cloud,
        calibration,
        camera,
    })
}

/// Rig the calibrated cloud, honoring a mapping cache when one matches.
pub fn stage_rig(
    calibrated: &CalibrationResult,
    cache: Option<&VertexMapping>,
) -> anyhow::Result<Rig> {
    build_rig(
        &calibrated.cloud.positions,
        calibrated.calibration.aabb_norm.height(),
        cache,
    )
}

pub struct AvatarSession {
    state: SessionState,
    refiner: Box<dyn Refiner>,
    encoder: Box<dyn IdentityEncoder>,
    splats: Option<SplatCloud>,
    skeleton: Option<Skeleton>,
    cams: Option<CameraMats>,
    identity: Vec<f32>,
    lip_sync: f32,
    display: DisplayNormalizer,
    displayed: Option<Vec<f32>>,
    frame_count: u64,
}

impl AvatarSession {
    pub fn new(refiner: Box<dyn Refiner>, encoder: Box<dyn IdentityEncoder>) -> Self {
        AvatarSession {
            state: SessionState::Idle,
            refiner,
            encoder,
            splats: None,
            skeleton: None,
            cams: None,
            identity: vec![],
            lip_sync: 0.,
            display: DisplayNormalizer::new(DEFAULT_BRIGHTNESS),
            displayed: None,
            frame_count: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn lip_sync(&self) -> f32 {
        self.lip_sync
    }

    pub fn skeleton(&self) -> Option<&Skeleton> {
        self.skeleton.as_ref()
    }

    pub fn camera(&self) -> Option<&CameraMats> {
        self.cams.as_ref()
    }

    pub fn splats_mut(&mut self) -> Option<&mut SplatCloud> {
        self.splats.as_mut()
    }

    /// Normalized display frame from the last refine, interleaved RGB.
    pub fn displayed_frame(&self) -> Option<&[f32]> {
        self.displayed.as_deref()
    }

    /// Drop all loaded state and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.splats = None;
        self.skeleton = None;
        self.cams = None;
        self.identity.clear();
        self.display.reset();
        self.displayed = None;
        self.frame_count = 0;
    }

    /// Fetch and prepare a complete avatar: point cloud, optional source
    /// photograph, optional vertex-mapping cache, optional camera config.
    ///
    /// A call while a previous load is in progress is rejected rather than
    /// restarted; a failed load resets the session to `Idle` so nothing
    /// half-initialized survives.
    pub fn load_assets(&mut self, assets: &AssetPaths) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.state != SessionState::Loading,
            "asset load already in progress"
        );
        self.reset();
        self.state = SessionState::Loading;
        match self.load_assets_inner(assets) {
            Ok(()) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    fn load_assets_inner(&mut self, assets: &AssetPaths) -> anyhow::Result<()> {
        let cloud = io_ply::read_ply(&assets.point_cloud)?;
        let camera_config = assets
            .camera_config
            .as_ref()
            .map(load_camera_config)
            .transpose()?;
        let calibrated = stage_calibrate(cloud, camera_config.as_ref())?;
        // an unusable cache is a performance problem, not a load failure
        let cache = match &assets.vertex_mapping {
            Some(path) => match rig::load_vertex_mapping(path) {
                Ok(mapping) => Some(mapping),
                Err(err) => {
                    log::warn!("vertex-mapping cache unavailable ({err:#}); computing at load time");
                    None
                }
            },
            None => None,
        };
        let rigged = stage_rig(&calibrated, cache.as_ref())?;
        self.identity = match &assets.source_photo {
            Some(path) => {
                let (rgb, img_shape) = read_photo_rgb(path)?;
                self.encoder.encode(&rgb, img_shape)?
            }
            None => vec![],
        };
        self.skeleton = Some(Skeleton {
            sites: rigged.sites,
        });
        self.cams = Some(calibrated.camera.clone());
        let mut splats = SplatCloud::new(calibrated.cloud, &rigged);
        splats.seed_latents_from_colors();
        self.splats = Some(splats);
        log::info!(
            "avatar ready: {} points, {} identity floats",
            self.splats.as_ref().map_or(0, |s| s.num_points),
            self.identity.len()
        );
        Ok(())
    }

    /// Push a new jaw-drive level, consumed by the next tick.
    pub fn update_lip_sync(&mut self, level: f32) {
        self.lip_sync = level.clamp(0., 1.);
    }

    /// One frame: pose solve, 8 feature passes, then refine-or-redisplay.
    ///
    /// Bone matrices are fully recomputed before any skinned pass reads
    /// them. The refiner only runs while no cached frame exists, which in
    /// practice means once per asset load.
    pub fn tick(&mut self, elapsed: f32) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.state == SessionState::Ready,
            "no avatar loaded; call load_assets first"
        );
        let skeleton = self.skeleton.as_ref().context("missing skeleton")?;
        let cams = self.cams.as_ref().context("missing camera")?;
        let splats = self.splats.as_mut().context("missing splat cloud")?;
        let pose = solve_pose(elapsed, self.lip_sync);
        let mats = bone_matrices(skeleton, &pose);
        let skinned = splats.skin_positions(&mats);
        let coarse = render_coarse_feature_map(splats, &skinned, cams)?;
        if self.displayed.is_none() {
            let refined = self.refiner.refine(&coarse, &self.identity)?;
            self.displayed = Some(self.display.normalize(&refined));
        }
        self.frame_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_map::CoarseFeatureMap;
    use crate::refine::{FlatRefiner, RefinedImage, REFINED_RES};
    use crate::test_cloud::humanoid_ply_bytes;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingRefiner {
        calls: Rc<Cell<u32>>,
    }

    impl Refiner for CountingRefiner {
        fn refine(
            &self,
            _coarse: &CoarseFeatureMap,
            _identity: &[f32],
        ) -> anyhow::Result<RefinedImage> {
            self.calls.set(self.calls.get() + 1);
            Ok(RefinedImage::filled(0.5))
        }
    }

    struct NullEncoder;

    impl crate::display::IdentityEncoder for NullEncoder {
        fn encode(&self, _rgb: &[f32], _img_shape: (usize, usize)) -> anyhow::Result<Vec<f32>> {
            Ok(vec![])
        }
    }

    fn temp_ply(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "gsavatar-session-{}-{}.ply",
            tag,
            std::process::id()
        ));
        std::fs::write(&path, humanoid_ply_bytes()).unwrap();
        path
    }

    fn test_session() -> AvatarSession {
        AvatarSession::new(
            Box::new(FlatRefiner { value: 0.5 }),
            Box::new(NullEncoder),
        )
    }

    #[test]
    fn test_load_tick_displays_mid_gray() {
        let ply = temp_ply("midgray");
        let mut session = test_session();
        session
            .load_assets(&AssetPaths {
                point_cloud: ply.clone(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        session.update_lip_sync(1.0);
        session.tick(0.).unwrap();
        let frame = session.displayed_frame().unwrap();
        assert_eq!(frame.len(), REFINED_RES * REFINED_RES * 3);
        assert!(frame.iter().all(|&v| (v - 0.5).abs() < 1.0e-6));
        std::fs::remove_file(ply).ok();
    }

    #[test]
    fn test_refine_runs_once_per_load() {
        let ply = temp_ply("once");
        let calls = Rc::new(Cell::new(0u32));
        let mut session = AvatarSession::new(
            Box::new(CountingRefiner {
                calls: calls.clone(),
            }),
            Box::new(NullEncoder),
        );
        session
            .load_assets(&AssetPaths {
                point_cloud: ply.clone(),
                ..Default::default()
            })
            .unwrap();
        session.tick(0.).unwrap();
        session.tick(0.016).unwrap();
        session.tick(0.033).unwrap();
        assert_eq!(session.frame_count(), 3);
        assert_eq!(calls.get(), 1);
        std::fs::remove_file(ply).ok();
    }

    #[test]
    fn test_tick_without_load_fails() {
        let mut session = test_session();
        assert!(session.tick(0.).is_err());
    }

    #[test]
    fn test_failed_load_resets_to_idle() {
        let mut session = test_session();
        let missing = AssetPaths {
            point_cloud: PathBuf::from("/nonexistent/avatar.ply"),
            ..Default::default()
        };
        assert!(session.load_assets(&missing).is_err());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.displayed_frame().is_none());
    }

    #[test]
    fn test_camera_config_wire_format() {
        let json = r#"{
            "position": {"x": 0.0, "y": 1.2, "z": 2.4},
            "target": {"x": 0.0, "y": 1.2, "z": 0.0},
            "fov": 40.0,
            "imageWidth": 512,
            "imageHeight": 512
        }"#;
        let cfg: CameraConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.image_width, 512);
        assert!((cfg.position.z - 2.4).abs() < 1.0e-6);
        assert!((cfg.fov - 40.0).abs() < 1.0e-6);
    }

    #[test]
    fn test_lip_sync_clamps() {
        let mut session = test_session();
        session.update_lip_sync(2.5);
        assert_eq!(session.lip_sync(), 1.0);
        session.update_lip_sync(-1.0);
        assert_eq!(session.lip_sync(), 0.0);
    }
}
