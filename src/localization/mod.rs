//! Localization of a single query image against a reconstructed scene.
//!
//! The [`CorrespondenceDatabase`](database::CorrespondenceDatabase) links the descriptor of
//! every landmark observation to its landmark. The [`Localizer`](localizer::Localizer) matches
//! query features against it and resects the camera from the resulting 2D-3D matches.

pub mod database;
pub mod error;
pub mod feature;
pub mod frame;
pub mod localizer;
pub mod scene;
