use nalgebra::{Matrix3, Vector2};

/// Iteration cap when inverting a radial distortion polynomial
const UNDISTORT_MAX_ITERATIONS: usize = 32;
/// Stop inverting once successive estimates move less than this (normalized units)
const UNDISTORT_TOLERANCE: f64 = 1e-12;

/// Camera intrinsic model as seen by the localizer
///
/// Only the pieces needed to rectify observed pixels and to optionally seed the
/// resection with a calibration matrix are exposed.
pub trait Intrinsic {
    /// Whether [`Intrinsic::undistort`] does anything
    fn has_distortion(&self) -> bool;

    /// Map an observed (distorted) pixel to where an ideal pinhole camera would have seen it
    fn undistort(&self, pixel: &Vector2<f64>) -> Vector2<f64>;

    /// Calibration matrix `K`, for models that are a pinhole camera at heart
    fn calibration(&self) -> Option<Matrix3<f64>> {
        None
    }
}

/// Ideal pinhole camera with square pixels and no skew
#[derive(Debug, Clone, PartialEq)]
pub struct Pinhole {
    pub focal: f64,
    pub principal_point: Vector2<f64>,
}

impl Pinhole {
    pub fn new(focal: f64, principal_point: Vector2<f64>) -> Self {
        Self {
            focal,
            principal_point,
        }
    }

    /// Pinhole camera with the principal point in the middle of a `width x height` image
    pub fn centered(focal: f64, width: f64, height: f64) -> Self {
        Self::new(focal, Vector2::new(width / 2.0, height / 2.0))
    }

    /// Camera Intrinsic `3x3` Matrix known as `K`
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal,
            0.0,
            self.principal_point.x,
            0.0,
            self.focal,
            self.principal_point.y,
            0.0,
            0.0,
            1.0,
        )
    }

    fn to_normalized(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        (pixel - self.principal_point) / self.focal
    }

    fn to_pixel(&self, normalized: &Vector2<f64>) -> Vector2<f64> {
        normalized * self.focal + self.principal_point
    }
}

impl Intrinsic for Pinhole {
    fn has_distortion(&self) -> bool {
        false
    }

    fn undistort(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        *pixel
    }

    fn calibration(&self) -> Option<Matrix3<f64>> {
        Some(self.matrix())
    }
}

/// Pinhole camera with Brown radial distortion
///
/// ```plain
/// x_d = x_u * (1 + k1 r^2 + k2 r^4 + k3 r^6),  r = |x_u|
/// ```
/// in normalized image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeRadial {
    pub pinhole: Pinhole,
    pub radial: [f64; 3],
}

impl PinholeRadial {
    pub fn new(pinhole: Pinhole, radial: [f64; 3]) -> Self {
        Self { pinhole, radial }
    }

    fn radial_factor(&self, r2: f64) -> f64 {
        // Horner evaluation in r^2
        let [k1, k2, k3] = self.radial;
        1.0 + r2 * (k1 + r2 * (k2 + r2 * k3))
    }

    /// Apply the distortion to an ideal pixel
    pub fn distort(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        let undistorted = self.pinhole.to_normalized(pixel);
        let distorted = undistorted * self.radial_factor(undistorted.norm_squared());
        self.pinhole.to_pixel(&distorted)
    }
}

impl Intrinsic for PinholeRadial {
    fn has_distortion(&self) -> bool {
        self.radial.iter().any(|&k| k != 0.0)
    }

    /// Fixed-point inversion of the radial polynomial.
    fn undistort(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        let distorted = self.pinhole.to_normalized(pixel);
        let mut undistorted = distorted;
        for _ in 0..UNDISTORT_MAX_ITERATIONS {
            let factor = self.radial_factor(undistorted.norm_squared());
            if factor.abs() < f64::EPSILON {
                break;
            }
            let next = distorted / factor;
            let step = (next - undistorted).norm();
            undistorted = next;
            if step < UNDISTORT_TOLERANCE {
                break;
            }
        }
        self.pinhole.to_pixel(&undistorted)
    }

    fn calibration(&self) -> Option<Matrix3<f64>> {
        Some(self.pinhole.matrix())
    }
}

/// What the caller told us about the query camera, resolved once per localization call
pub enum CameraHint<'a> {
    /// No intrinsic model: points are used as observed, resection is uncalibrated
    Unknown,
    /// An intrinsic model that can rectify points but offers no calibration matrix
    Uncalibrated(&'a dyn Intrinsic),
    /// A pinhole-family model whose `K` seeds the resection
    Pinhole {
        intrinsic: &'a dyn Intrinsic,
        calibration: Matrix3<f64>,
    },
}

impl<'a> CameraHint<'a> {
    /// Classify an optional intrinsic model.
    ///
    /// With `allow_calibration` unset, pinhole models are demoted to [`CameraHint::Uncalibrated`].
    pub fn resolve(intrinsic: Option<&'a dyn Intrinsic>, allow_calibration: bool) -> Self {
        match intrinsic {
            None => Self::Unknown,
            Some(intrinsic) => match intrinsic.calibration() {
                Some(calibration) if allow_calibration => Self::Pinhole {
                    intrinsic,
                    calibration,
                },
                _ => Self::Uncalibrated(intrinsic),
            },
        }
    }

    pub fn intrinsic(&self) -> Option<&'a dyn Intrinsic> {
        match self {
            Self::Unknown => None,
            Self::Uncalibrated(intrinsic) | Self::Pinhole { intrinsic, .. } => Some(*intrinsic),
        }
    }

    pub fn calibration(&self) -> Option<&Matrix3<f64>> {
        match self {
            Self::Pinhole { calibration, .. } => Some(calibration),
            _ => None,
        }
    }

    /// Undistorted pixel used for estimation, or `None` when the observed one is already ideal
    pub fn rectify(&self, pixel: &Vector2<f64>) -> Option<Vector2<f64>> {
        self.intrinsic()
            .filter(|intrinsic| intrinsic.has_distortion())
            .map(|intrinsic| intrinsic.undistort(pixel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Shifted;

    impl Intrinsic for Shifted {
        fn has_distortion(&self) -> bool {
            true
        }

        fn undistort(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
            pixel + Vector2::new(1.0, 1.0)
        }
    }

    #[test]
    fn radial_undistort_inverts_distort() {
        let camera = PinholeRadial::new(
            Pinhole::centered(700.0, 1280.0, 960.0),
            [-0.12, 0.03, -0.002],
        );
        for pixel in [
            Vector2::new(640.0, 480.0),
            Vector2::new(100.0, 50.0),
            Vector2::new(1200.0, 900.0),
            Vector2::new(320.5, 811.25),
        ] {
            let distorted = camera.distort(&pixel);
            assert_relative_eq!(camera.undistort(&distorted), pixel, epsilon = 1e-6);
        }
    }

    #[test]
    fn zero_coefficients_are_not_distortion() {
        let camera = PinholeRadial::new(Pinhole::centered(700.0, 640.0, 480.0), [0.0; 3]);
        assert!(!camera.has_distortion());
        assert!(!Pinhole::centered(700.0, 640.0, 480.0).has_distortion());
    }

    #[test]
    fn hint_resolution() {
        let pinhole = Pinhole::centered(500.0, 640.0, 480.0);

        assert!(matches!(CameraHint::resolve(None, true), CameraHint::Unknown));
        assert!(matches!(
            CameraHint::resolve(Some(&Shifted), true),
            CameraHint::Uncalibrated(_)
        ));

        let hint = CameraHint::resolve(Some(&pinhole), true);
        assert_eq!(hint.calibration(), Some(&pinhole.matrix()));

        let hint = CameraHint::resolve(Some(&pinhole), false);
        assert!(matches!(hint, CameraHint::Uncalibrated(_)));
        assert!(hint.calibration().is_none());
    }

    #[test]
    fn rectify_only_when_distorted() {
        let pixel = Vector2::new(10.0, 20.0);
        let pinhole = Pinhole::centered(500.0, 640.0, 480.0);

        assert_eq!(CameraHint::Unknown.rectify(&pixel), None);
        assert_eq!(CameraHint::resolve(Some(&pinhole), true).rectify(&pixel), None);
        assert_eq!(
            CameraHint::resolve(Some(&Shifted), true).rectify(&pixel),
            Some(Vector2::new(11.0, 21.0))
        );
    }
}
