use thiserror::Error;

use crate::localization::scene::{LandmarkId, ViewId};

/// Reasons the correspondence database could not be built
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("no per-view descriptors were provided")]
    NoViewDescriptors,

    #[error("the scene has no 3D content to match with ({poses} poses, {landmarks} landmarks)")]
    EmptyScene { poses: usize, landmarks: usize },

    #[error("landmark {landmark} is observed in view {view}, which has no descriptors")]
    MissingView { landmark: LandmarkId, view: ViewId },

    #[error("landmark {landmark} refers to feature {feature} of view {view}, which does not exist")]
    MissingFeature {
        landmark: LandmarkId,
        view: ViewId,
        feature: usize,
    },
}

/// Reasons descriptor matching could not run
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("the query has no features")]
    EmptyQuery,

    #[error("the database holds no descriptors")]
    EmptyDatabase,
}

/// Hard failures of a localization request
///
/// Failing to find a pose is not one of them, see
/// [`Localization::pose`](crate::localization::localizer::Localization::pose).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocalizeError {
    #[error("the localizer was not initialized with a scene")]
    NotInitialized,

    #[error("putative matching failed: {0}")]
    Matching(#[from] MatchError),

    #[error("database entry refers to landmark {0}, which is not in the scene")]
    UnknownLandmark(LandmarkId),
}
