use std::collections::BTreeMap;

use nalgebra::{Matrix3, Matrix3x4, Vector2, Vector3};

use crate::algorithms::camera::compose_projection;

pub type ViewId = u32;
pub type LandmarkId = u32;

/// Camera pose stored as a rotation and the position of the optical centre
///
/// ```plain
/// X_camera = R (X_world - C) = R X_world + t,  t = -R C
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    /// 3D Rotation Matrix from the world frame into the camera frame
    pub rotation: Matrix3<f64>,
    /// Camera centre in world coordinates
    pub center: Vector3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            rotation: Matrix3::identity(),
            center: Vector3::zeros(),
        }
    }
}

impl Pose {
    pub fn new(rotation: Matrix3<f64>, center: Vector3<f64>) -> Self {
        Self { rotation, center }
    }

    pub fn translation(&self) -> Vector3<f64> {
        -self.rotation * self.center
    }

    /// Express a world point in the camera frame
    pub fn transform(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * (point - self.center)
    }

    /// Projection matrix `K[R|t]` of this pose seen through `intrinsic`
    pub fn projection(&self, intrinsic: &Matrix3<f64>) -> Matrix3x4<f64> {
        compose_projection(intrinsic, &self.rotation, &self.translation())
    }
}

/// One view's sighting of a landmark
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Where the landmark was seen in the view
    pub position: Vector2<f64>,
    /// Index of the feature in the view's [`Frame`](crate::localization::frame::Frame).
    /// `None` when the observation was never linked to an extracted feature.
    pub feature: Option<usize>,
}

impl Observation {
    pub fn new(position: Vector2<f64>, feature: usize) -> Self {
        Self {
            position,
            feature: Some(feature),
        }
    }

    /// Observation without an associated feature
    pub fn unlinked(position: Vector2<f64>) -> Self {
        Self {
            position,
            feature: None,
        }
    }
}

/// A reconstructed 3D point and the views that observed it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Landmark {
    pub position: Vector3<f64>,
    pub observations: BTreeMap<ViewId, Observation>,
}

impl Landmark {
    pub fn new(position: Vector3<f64>) -> Self {
        Self {
            position,
            observations: BTreeMap::new(),
        }
    }

    pub fn with_observation(mut self, view: ViewId, observation: Observation) -> Self {
        self.observations.insert(view, observation);
        self
    }
}

/// Read-only snapshot of a reconstruction: the known view poses and the landmarks
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    pub poses: BTreeMap<ViewId, Pose>,
    pub landmarks: BTreeMap<LandmarkId, Landmark>,
}

impl Scene {
    pub fn landmark(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(&id)
    }

    /// Whether there is anything to localize against
    pub fn has_structure(&self) -> bool {
        !self.poses.is_empty() && !self.landmarks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    #[test]
    fn pose_transform_agrees_with_translation() {
        let pose = Pose::new(
            *Rotation3::from_euler_angles(0.2, 0.4, -0.1).matrix(),
            Vector3::new(1.0, 2.0, 3.0),
        );
        let point = Vector3::new(-0.5, 4.0, 10.0);
        assert_relative_eq!(
            pose.transform(&point),
            pose.rotation * point + pose.translation(),
            epsilon = 1e-12
        );
        assert_relative_eq!(pose.transform(&pose.center), Vector3::zeros());
    }

    #[test]
    fn structure_requires_poses_and_landmarks() {
        let mut scene = Scene::default();
        assert!(!scene.has_structure());
        scene.landmarks.insert(3, Landmark::new(Vector3::zeros()));
        assert!(!scene.has_structure());
        scene.poses.insert(0, Pose::default());
        assert!(scene.has_structure());
        assert!(scene.landmark(3).is_some());
        assert!(scene.landmark(4).is_none());
    }
}
