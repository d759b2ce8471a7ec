use log::{debug, info};
use nalgebra::{Matrix3x4, Vector2, Vector3};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    algorithms::{
        camera::{decompose_projection, project},
        intrinsics::{CameraHint, Intrinsic},
        resection::{
            robust_resection, Correspondence, ImageSize, ResectionParams,
            DEFAULT_CONSENSUS_ATTEMPTS, DEFAULT_INLIER_THRESHOLD,
        },
    },
    localization::{
        database::{CorrespondenceDatabase, DEFAULT_RATIO},
        error::{InitError, LocalizeError},
        feature::Descriptor,
        frame::{Frame, ViewFrames},
        scene::{LandmarkId, Pose, Scene},
    },
};

/// Tunables of the localizer. The defaults are the usual single image localization setup.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizerConfig {
    /// Lowe's distance ratio for putative matches
    pub ratio: f32,
    /// Largest reprojection error, in pixels, of a correspondence counted as an inlier
    pub inlier_threshold: f64,
    /// Independent consensus searches per request
    pub consensus_attempts: usize,
    /// Hand the calibration matrix of pinhole intrinsics to the resection
    pub use_calibration_hint: bool,
    /// Seed of the consensus search. `None` seeds from the OS on every request.
    pub seed: Option<u64>,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            ratio: DEFAULT_RATIO,
            inlier_threshold: DEFAULT_INLIER_THRESHOLD,
            consensus_attempts: DEFAULT_CONSENSUS_ATTEMPTS,
            use_calibration_hint: true,
            seed: None,
        }
    }
}

impl LocalizerConfig {
    pub fn with_ratio(mut self, ratio: f32) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn with_inlier_threshold(mut self, inlier_threshold: f64) -> Self {
        self.inlier_threshold = inlier_threshold;
        self
    }

    pub fn with_consensus_attempts(mut self, consensus_attempts: usize) -> Self {
        self.consensus_attempts = consensus_attempts;
        self
    }

    pub fn with_calibration_hint(mut self, use_calibration_hint: bool) -> Self {
        self.use_calibration_hint = use_calibration_hint;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn resection_params(&self) -> ResectionParams {
        ResectionParams {
            inlier_threshold: self.inlier_threshold,
            attempts: self.consensus_attempts,
        }
    }
}

/// 2D-3D correspondences of one localization request and what the resection made of them
///
/// The arrays are parallel, one slot per putative match. `image_points` are always the
/// observed pixels, even when undistorted ones were used for the estimation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResectionData {
    pub world_points: Vec<Vector3<f64>>,
    pub image_points: Vec<Vector2<f64>>,
    /// Landmark behind each world point
    pub landmark_ids: Vec<LandmarkId>,
    /// Query feature behind each image point
    pub feature_indices: Vec<usize>,
    /// Slots consistent with `projection`, empty when the resection failed
    pub inliers: Vec<usize>,
    pub projection: Option<Matrix3x4<f64>>,
    /// Largest reprojection error among the inliers
    pub threshold: f64,
}

impl ResectionData {
    pub fn len(&self) -> usize {
        self.world_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.world_points.is_empty()
    }

    /// Root mean square reprojection error of the inliers.
    ///
    /// Pass the intrinsic used for localization so distorted pixels are rectified the same way.
    pub fn inlier_rmse(&self, intrinsic: Option<&dyn Intrinsic>) -> Option<f64> {
        let projection = self.projection.as_ref()?;
        if self.inliers.is_empty() {
            return None;
        }
        let hint = CameraHint::resolve(intrinsic, false);

        let mut sum = 0.0;
        for &i in &self.inliers {
            let observed = self.image_points[i];
            let rectified = hint.rectify(&observed).unwrap_or(observed);
            sum += (project(projection, &self.world_points[i])? - rectified).norm_squared();
        }
        Some((sum / self.inliers.len() as f64).sqrt())
    }
}

/// Result of a localization request that ran to completion
#[derive(Debug, Clone, PartialEq)]
pub struct Localization {
    /// `None` when no geometrically consistent pose was found
    pub pose: Option<Pose>,
    pub resection: ResectionData,
}

impl Localization {
    pub fn is_localized(&self) -> bool {
        self.pose.is_some()
    }
}

/// Localizes single images against a reconstructed scene
///
/// [`Localizer::init`] builds the descriptor database once, after which any number of
/// [`Localizer::localize`] calls, from any number of threads, only read it. The scene is
/// borrowed for the lifetime of the localizer.
pub struct Localizer<'s, D> {
    config: LocalizerConfig,
    scene: Option<&'s Scene>,
    database: Option<CorrespondenceDatabase<D>>,
}

impl<'s, D: Descriptor> Default for Localizer<'s, D> {
    fn default() -> Self {
        Self::new(LocalizerConfig::default())
    }
}

impl<'s, D: Descriptor> Localizer<'s, D> {
    pub fn new(config: LocalizerConfig) -> Self {
        Self {
            config,
            scene: None,
            database: None,
        }
    }

    pub fn config(&self) -> &LocalizerConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.scene.is_some() && self.database.is_some()
    }

    pub fn database(&self) -> Option<&CorrespondenceDatabase<D>> {
        self.database.as_ref()
    }

    /// Build the correspondence database from the landmarks of `scene`.
    ///
    /// On failure the localizer is left uninitialized.
    pub fn init(&mut self, scene: &'s Scene, views: &ViewFrames<D>) -> Result<(), InitError> {
        self.scene = None;
        self.database = None;

        let database = CorrespondenceDatabase::build(scene, views)?;
        self.database = Some(database);
        self.scene = Some(scene);
        Ok(())
    }

    /// Estimate the pose of the camera that captured `query`.
    ///
    /// `intrinsic` is optional; when given, distorted observations are rectified before
    /// the resection and pinhole calibrations seed it. A request that finds no consistent
    /// pose still succeeds, with [`Localization::pose`] unset.
    pub fn localize(
        &self,
        image_size: ImageSize,
        intrinsic: Option<&dyn Intrinsic>,
        query: &Frame<D>,
    ) -> Result<Localization, LocalizeError> {
        let (scene, database) = match (self.scene, &self.database) {
            (Some(scene), Some(database)) => (scene, database),
            _ => return Err(LocalizeError::NotInitialized),
        };

        let matches = database.match_frame(query, self.config.ratio)?;
        debug!("#3D-2D putative correspondences: {}", matches.len());

        let hint = CameraHint::resolve(intrinsic, self.config.use_calibration_hint);

        let mut resection = ResectionData::default();
        let mut correspondences = Vec::with_capacity(matches.len());
        for m in &matches {
            let landmark_id = database.entries()[m.database].1;
            let landmark = scene
                .landmark(landmark_id)
                .ok_or(LocalizeError::UnknownLandmark(landmark_id))?;
            let observed = query.features[m.query].keypoint;

            // the estimator sees undistorted pixels, the caller gets the observed ones back
            let rectified = hint.rectify(&observed).unwrap_or(observed);
            correspondences.push(Correspondence::new(rectified, landmark.position));

            resection.world_points.push(landmark.position);
            resection.image_points.push(observed);
            resection.landmark_ids.push(landmark_id);
            resection.feature_indices.push(m.query);
        }

        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let params = self.config.resection_params();
        let pose = robust_resection(
            image_size,
            &correspondences,
            hint.calibration(),
            &params,
            rng,
        )
        .and_then(|estimate| {
            let factors = decompose_projection(&estimate.projection)?;
            resection.inliers = estimate.inliers;
            resection.projection = Some(estimate.projection);
            resection.threshold = estimate.threshold;
            Some(Pose::new(factors.rotation, factors.camera_center()))
        });

        info!(
            "Robust resection: status {}, {} points used, {} validated, threshold {}",
            pose.is_some(),
            correspondences.len(),
            resection.inliers.len(),
            resection.threshold
        );

        Ok(Localization { pose, resection })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_resects_like_default_params() {
        let config = LocalizerConfig::default();
        assert_eq!(config.resection_params(), ResectionParams::default());
        assert_eq!(config.ratio, DEFAULT_RATIO);

        let tuned = config.with_inlier_threshold(1.5).with_consensus_attempts(3);
        assert_eq!(
            tuned.resection_params(),
            ResectionParams {
                inlier_threshold: 1.5,
                attempts: 3,
            }
        );
    }
}
