//! Camera pose recovery for a single image against a previously reconstructed scene.
//!
//! Descriptors of every landmark observation are gathered once into a correspondence
//! database. Each query image is then matched against it and the putative 2D-3D
//! correspondences are fed to a robust resection, whose projection matrix is decomposed
//! into the camera pose.

pub mod algorithms;
pub mod localization;

pub use algorithms::{
    intrinsics::{CameraHint, Intrinsic, Pinhole, PinholeRadial},
    resection::ImageSize,
};
pub use localization::{
    database::{CorrespondenceDatabase, PutativeMatch},
    error::{InitError, LocalizeError, MatchError},
    feature::{BinaryDescriptor, Descriptor, Feature, FloatDescriptor},
    frame::{Frame, ViewFrames},
    localizer::{Localization, Localizer, LocalizerConfig, ResectionData},
    scene::{Landmark, LandmarkId, Observation, Pose, Scene, ViewId},
};
