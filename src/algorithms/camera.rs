use nalgebra::{Matrix3, Matrix3x4, Vector2, Vector3};

/// Homogeneous coordinates with a smaller last component are considered to lie at infinity
const HOMOGENEOUS_EPSILON: f64 = 1e-12;

/// Factors of a camera projection matrix written as `P = K[R|t]`
///
/// ```plain
/// K: upper triangular calibration with a positive diagonal and K[2][2] = 1
/// R: 3D Rotation Matrix (det R = +1)
/// t: translation of the world origin expressed in the camera frame
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionFactors {
    pub intrinsic: Matrix3<f64>,
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl ProjectionFactors {
    /// Position of the optical centre in world coordinates, `C = -R^T t`
    pub fn camera_center(&self) -> Vector3<f64> {
        -self.rotation.transpose() * self.translation
    }
}

/// Build `P = K[R|t]`
pub fn compose_projection(
    intrinsic: &Matrix3<f64>,
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
) -> Matrix3x4<f64> {
    let mut extrinsic = Matrix3x4::zeros();
    extrinsic.fixed_slice_mut::<3, 3>(0, 0).copy_from(rotation);
    extrinsic.set_column(3, translation);
    intrinsic * extrinsic
}

/// Project a world point through `P`, returning `None` for points on the camera plane.
pub fn project(projection: &Matrix3x4<f64>, point: &Vector3<f64>) -> Option<Vector2<f64>> {
    let image = projection * point.push(1.0);
    if image.z.abs() < HOMOGENEOUS_EPSILON {
        return None;
    }
    Some(Vector2::new(image.x / image.z, image.y / image.z))
}

/// Cosine and sine of the Givens rotation normalising `(c, s)`.
fn givens(c: f64, s: f64) -> (f64, f64) {
    let l = c.hypot(s);
    (c / l, s / l)
}

/// Factor a projection matrix into calibration, rotation and translation.
///
/// The left `3x3` block is split with an RQ decomposition built from three Givens rotations
/// (Hartley & Zisserman, A4.1.1), zeroing `K[2][1]`, `K[2][0]` and then `K[1][0]`.
/// Signs are then fixed so the diagonal of `K` is positive and `R` is a proper rotation.
/// `P` is only defined up to scale, so a negated input yields the same factors.
///
/// Returns `None` when the left block is singular.
pub fn decompose_projection(projection: &Matrix3x4<f64>) -> Option<ProjectionFactors> {
    let mut k: Matrix3<f64> = projection.fixed_slice::<3, 3>(0, 0).into_owned();
    let mut q = Matrix3::<f64>::identity();

    // rotation about x
    if k.m32 != 0.0 {
        let (c, s) = givens(-k.m33, k.m32);
        let qx = Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c);
        k *= qx;
        q = qx.transpose() * q;
    }

    // rotation about y
    if k.m31 != 0.0 {
        let (c, s) = givens(k.m33, k.m31);
        let qy = Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c);
        k *= qy;
        q = qy.transpose() * q;
    }

    // rotation about z
    if k.m21 != 0.0 {
        let (c, s) = givens(-k.m22, k.m21);
        let qz = Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0);
        k *= qz;
        q = qz.transpose() * q;
    }

    let mut rotation = q;

    if k.m33 < 0.0 {
        k = -k;
        rotation = -rotation;
    }
    if k.m22 < 0.0 {
        let flip = Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, 1.0));
        k *= flip;
        rotation = flip * rotation;
    }
    if k.m11 < 0.0 {
        let flip = Matrix3::from_diagonal(&Vector3::new(-1.0, 1.0, 1.0));
        k *= flip;
        rotation = flip * rotation;
    }

    if k.m33.abs() < HOMOGENEOUS_EPSILON {
        return None;
    }
    let mut translation = k.lu().solve(&projection.column(3).into_owned())?;

    if rotation.determinant() < 0.0 {
        rotation = -rotation;
        translation = -translation;
    }

    let intrinsic = k / k.m33;

    Some(ProjectionFactors {
        intrinsic,
        rotation,
        translation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn intrinsic() -> Matrix3<f64> {
        Matrix3::new(820.0, 0.5, 640.0, 0.0, 790.0, 480.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn decomposition_recovers_factors() {
        let rotation = *Rotation3::from_euler_angles(0.3, -0.2, 1.1).matrix();
        let translation = Vector3::new(0.4, -1.2, 6.0);
        let projection = compose_projection(&intrinsic(), &rotation, &translation);

        let factors = decompose_projection(&projection).unwrap();
        assert_relative_eq!(factors.intrinsic, intrinsic(), epsilon = 1e-8);
        assert_relative_eq!(factors.rotation, rotation, epsilon = 1e-10);
        assert_relative_eq!(factors.translation, translation, epsilon = 1e-8);
    }

    #[test]
    fn decomposition_ignores_projective_scale() {
        let rotation = *Rotation3::from_euler_angles(-0.7, 0.1, 0.25).matrix();
        let translation = Vector3::new(-2.0, 0.5, 3.0);
        let projection = compose_projection(&intrinsic(), &rotation, &translation);

        for scale in [-3.5, 1e-3, 42.0] {
            let factors = decompose_projection(&(projection * scale)).unwrap();
            assert_relative_eq!(factors.rotation, rotation, epsilon = 1e-9);
            assert_relative_eq!(
                factors.camera_center(),
                -rotation.transpose() * translation,
                epsilon = 1e-8
            );
        }
    }

    #[test]
    fn singular_projection_is_rejected() {
        let projection = Matrix3x4::new(
            1.0, 2.0, 3.0, 4.0, //
            2.0, 4.0, 6.0, 8.0, //
            0.0, 0.0, 0.0, 1.0,
        );
        assert!(decompose_projection(&projection).is_none());
    }

    #[test]
    fn projection_matches_pinhole_model() {
        let projection = compose_projection(&intrinsic(), &Matrix3::identity(), &Vector3::zeros());
        let pixel = project(&projection, &Vector3::new(1.0, -0.5, 2.0)).unwrap();
        assert_relative_eq!(pixel, Vector2::new(1049.875, 282.5), epsilon = 1e-9);
        assert!(project(&projection, &Vector3::new(1.0, 1.0, 0.0)).is_none());
    }
}
