use arrsac::Arrsac;
use nalgebra::{DMatrix, Matrix3, Matrix3x4, Matrix4, Vector2, Vector3};
use rand::RngCore;
use sample_consensus::{Consensus, Estimator, Model};

use crate::algorithms::camera::{compose_projection, project};

/// Inlier bound, in pixels, used unless configured otherwise
pub const DEFAULT_INLIER_THRESHOLD: f64 = 4.0;
/// Consensus searches per resection unless configured otherwise
pub const DEFAULT_CONSENSUS_ATTEMPTS: usize = 8;

/// Smallest meaningful spread of the world points or scale of a solution
const DEGENERACY_EPSILON: f64 = 1e-12;

/// Size of an image in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Similarity moving the image centre to the origin and scaling by the mean image dimension.
    ///
    /// Falls back to the identity for an empty image.
    fn normalization(&self) -> Matrix3<f64> {
        let mean_dimension = (self.width as f64 + self.height as f64) / 2.0;
        if mean_dimension <= 0.0 {
            return Matrix3::identity();
        }
        let scale = 1.0 / mean_dimension;
        Matrix3::new(
            scale,
            0.0,
            -scale * self.width as f64 / 2.0,
            0.0,
            scale,
            -scale * self.height as f64 / 2.0,
            0.0,
            0.0,
            1.0,
        )
    }
}

/// A 2D image point paired with the 3D world point it is believed to observe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub image: Vector2<f64>,
    pub world: Vector3<f64>,
}

impl Correspondence {
    pub fn new(image: Vector2<f64>, world: Vector3<f64>) -> Self {
        Self { image, world }
    }
}

/// Camera projection matrix `P` mapping homogeneous world points to homogeneous pixels
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionMatrix(pub Matrix3x4<f64>);

impl Model<Correspondence> for ProjectionMatrix {
    /// Reprojection error in pixels
    fn residual(&self, data: &Correspondence) -> f64 {
        project(&self.0, &data.world)
            .map(|pixel| (pixel - data.image).norm())
            .unwrap_or(f64::INFINITY)
    }
}

/// Direct Linear Transform resection from six or more correspondences.
///
/// Without a calibration matrix the full `3x4` projection is solved for (11 DoF).
/// With one, pixels are moved into normalized camera coordinates first and the
/// linear solution is projected onto a rotation, so the result is exactly `K[R|t]`.
#[derive(Debug, Clone)]
pub struct ResectionEstimator {
    /// Maps pixels into the frame the linear system is solved in
    image_normalization: Matrix3<f64>,
    /// Maps solutions back out into pixels
    image_denormalization: Matrix3<f64>,
    calibration: Option<Matrix3<f64>>,
}

impl ResectionEstimator {
    /// A calibration matrix that cannot be inverted is ignored.
    pub fn new(image_size: ImageSize, calibration: Option<&Matrix3<f64>>) -> Self {
        if let Some((k, k_inverse)) = calibration.and_then(|k| Some((*k, k.try_inverse()?))) {
            return Self {
                image_normalization: k_inverse,
                image_denormalization: k,
                calibration: Some(k),
            };
        }

        let image_normalization = image_size.normalization();
        Self {
            image_denormalization: image_normalization
                .try_inverse()
                .unwrap_or_else(Matrix3::identity),
            image_normalization,
            calibration: None,
        }
    }

    #[cfg(test)]
    fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// Least squares projection through all the given correspondences.
    pub fn solve<I>(&self, data: I) -> Option<ProjectionMatrix>
    where
        I: Iterator<Item = Correspondence>,
    {
        let points: Vec<Correspondence> = data.collect();
        let n = points.len();
        if n < <Self as Estimator<Correspondence>>::MIN_SAMPLES {
            return None;
        }

        // Condition the world points: centroid at the origin, mean distance sqrt(3)
        let centroid = points.iter().map(|c| c.world).sum::<Vector3<f64>>() / n as f64;
        let spread = points.iter().map(|c| (c.world - centroid).norm()).sum::<f64>() / n as f64;
        if spread < DEGENERACY_EPSILON {
            return None;
        }
        let scale = 3f64.sqrt() / spread;
        let world_normalization = Matrix4::new(
            scale,
            0.0,
            0.0,
            -scale * centroid.x,
            0.0,
            scale,
            0.0,
            -scale * centroid.y,
            0.0,
            0.0,
            scale,
            -scale * centroid.z,
            0.0,
            0.0,
            0.0,
            1.0,
        );

        // Each correspondence gives two rows of A p = 0, with p the row-major entries of P:
        // [ X^T  0   -u X^T ]
        // [ 0    X^T -v X^T ]
        const COLUMNS: usize = 12;
        let mut matrix_a = DMatrix::<f64>::zeros(2 * n, COLUMNS);
        for (i, correspondence) in points.iter().enumerate() {
            let world = world_normalization * correspondence.world.push(1.0);
            let image = self.image_normalization * correspondence.image.push(1.0);
            let (u, v) = (image.x / image.z, image.y / image.z);

            for j in 0..4 {
                matrix_a[(2 * i, j)] = world[j];
                matrix_a[(2 * i, 8 + j)] = -u * world[j];
                matrix_a[(2 * i + 1, 4 + j)] = world[j];
                matrix_a[(2 * i + 1, 8 + j)] = -v * world[j];
            }
        }

        // The solution is the right singular vector of the smallest singular value.
        let svd = matrix_a.svd(false, true);
        let matrix_v_t = svd.v_t?;
        let smallest = svd.singular_values.imin();
        let normalized = Matrix3x4::from_row_iterator(matrix_v_t.row(smallest).iter().copied())
            * world_normalization;

        let projection = match &self.calibration {
            Some(k) => Self::upgrade_to_euclidean(k, normalized)?,
            None => self.image_denormalization * normalized,
        };

        projection
            .iter()
            .all(|value| value.is_finite())
            .then(|| ProjectionMatrix(projection))
    }

    /// Snap a normalized-coordinate solution `s[M|m]` onto the nearest `K[R|t]`.
    fn upgrade_to_euclidean(
        calibration: &Matrix3<f64>,
        mut normalized: Matrix3x4<f64>,
    ) -> Option<Matrix3x4<f64>> {
        if normalized.fixed_slice::<3, 3>(0, 0).determinant() < 0.0 {
            normalized = -normalized;
        }

        let svd = normalized.fixed_slice::<3, 3>(0, 0).into_owned().svd(true, true);
        let scale = svd.singular_values.sum() / 3.0;
        if scale < DEGENERACY_EPSILON {
            return None;
        }
        let rotation = svd.u? * svd.v_t?;
        if rotation.determinant() < 0.0 {
            return None;
        }
        let translation = normalized.column(3).into_owned() / scale;

        Some(compose_projection(calibration, &rotation, &translation))
    }
}

impl Estimator<Correspondence> for ResectionEstimator {
    const MIN_SAMPLES: usize = 6;
    type Model = ProjectionMatrix;
    type ModelIter = Option<ProjectionMatrix>;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = Correspondence> + Clone,
    {
        self.solve(data)
    }
}

/// Outcome of a successful robust resection
#[derive(Debug, Clone, PartialEq)]
pub struct Resection {
    pub projection: Matrix3x4<f64>,
    /// Indices into the input correspondences consistent with `projection`
    pub inliers: Vec<usize>,
    /// Largest reprojection error among the inliers
    pub threshold: f64,
}

fn consensus_set(
    model: &ProjectionMatrix,
    correspondences: &[Correspondence],
    inlier_threshold: f64,
) -> Vec<usize> {
    correspondences
        .iter()
        .enumerate()
        .filter(|(_, c)| model.residual(c) < inlier_threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Tunables of [`robust_resection`]
#[derive(Debug, Clone, PartialEq)]
pub struct ResectionParams {
    /// Largest reprojection error, in pixels, of a correspondence counted as an inlier
    pub inlier_threshold: f64,
    /// Independent consensus searches; the largest consensus set wins
    pub attempts: usize,
}

impl Default for ResectionParams {
    fn default() -> Self {
        Self {
            inlier_threshold: DEFAULT_INLIER_THRESHOLD,
            attempts: DEFAULT_CONSENSUS_ATTEMPTS,
        }
    }
}

/// Estimate the camera projection from putative 2D-3D correspondences containing outliers.
///
/// This is an ARRSAC (Adaptive Real-Time Random Sample Consensus) search over the DLT
/// estimator, repeated `attempts` times, followed by a least squares refit on the largest
/// consensus set which is kept when it does not lose any inliers.
/// https://people.inf.ethz.ch/pomarc/pubs/RaguramECCV08.pdf
///
/// Returns `None` when there are too few correspondences or no consensus was found.
pub fn robust_resection<R: RngCore>(
    image_size: ImageSize,
    correspondences: &[Correspondence],
    calibration: Option<&Matrix3<f64>>,
    params: &ResectionParams,
    mut rng: R,
) -> Option<Resection> {
    let min_samples = <ResectionEstimator as Estimator<Correspondence>>::MIN_SAMPLES;
    if correspondences.len() < min_samples {
        return None;
    }
    let estimator = ResectionEstimator::new(image_size, calibration);

    let mut best: Option<(ProjectionMatrix, Vec<usize>)> = None;
    for _ in 0..params.attempts.max(1) {
        let found = Arrsac::new(params.inlier_threshold, &mut rng)
            .model_inliers(&estimator, correspondences.iter().copied())
            .map(|(model, inliers)| (model, inliers.into_iter().collect::<Vec<usize>>()));

        if let Some((model, inliers)) = found {
            if best.as_ref().map_or(true, |(_, most)| inliers.len() > most.len()) {
                best = Some((model, inliers));
            }
        }
        if matches!(&best, Some((_, inliers)) if inliers.len() == correspondences.len()) {
            break;
        }
    }
    let (model, inliers) = best?;

    let (model, inliers) = match estimator.solve(inliers.iter().map(|&i| correspondences[i])) {
        Some(refined) => {
            let refined_inliers =
                consensus_set(&refined, correspondences, params.inlier_threshold);
            if refined_inliers.len() >= inliers.len() {
                (refined, refined_inliers)
            } else {
                (model, inliers)
            }
        }
        None => (model, inliers),
    };

    if inliers.len() < min_samples {
        return None;
    }

    let threshold = inliers
        .iter()
        .map(|&i| model.residual(&correspondences[i]))
        .fold(0.0, f64::max);

    Some(Resection {
        projection: model.0,
        inliers,
        threshold,
    })
}
