use log::{info, warn};
use space::{Knn, KnnFromBatch, LinearKnn};

use crate::localization::{
    error::{InitError, MatchError},
    feature::Descriptor,
    frame::{Frame, ViewFrames},
    scene::{LandmarkId, Scene},
};

/// Distance ratio used by Lowe's test unless configured otherwise
pub const DEFAULT_RATIO: f32 = 0.8;

/// A query feature paired with the database entry it resembles most
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutativeMatch {
    /// Index of the feature in the query frame
    pub query: usize,
    /// Index of the entry in the database
    pub database: usize,
}

/// Descriptors of every landmark observation, each tagged with the landmark it observes
///
/// Entry `i` holds a copy of one observation's descriptor and its landmark id side by
/// side, so the index to landmark mapping cannot drift from the descriptor storage.
/// The database is built once and only read afterwards. The entries themselves are the
/// search structure: [`CorrespondenceDatabase::search`] scans them linearly in place.
#[derive(Debug, Clone)]
pub struct CorrespondenceDatabase<D> {
    entries: Vec<(D, LandmarkId)>,
}

impl<D: Descriptor> CorrespondenceDatabase<D> {
    /// Gather the descriptor of every linked observation of every landmark.
    ///
    /// Observations without a feature index are skipped.
    pub fn build(scene: &Scene, views: &ViewFrames<D>) -> Result<Self, InitError> {
        if views.is_empty() {
            return Err(InitError::NoViewDescriptors);
        }

        if !scene.has_structure() {
            warn!("The input scene has no 3D content to match with");
            return Err(InitError::EmptyScene {
                poses: scene.poses.len(),
                landmarks: scene.landmarks.len(),
            });
        }

        let mut descriptors = Vec::new();
        let mut landmark_ids = Vec::new();
        for (&landmark, track) in &scene.landmarks {
            for (&view, observation) in &track.observations {
                let Some(feature) = observation.feature else {
                    continue;
                };

                let frame = views
                    .get(&view)
                    .ok_or(InitError::MissingView { landmark, view })?;

                // copy the descriptor, then link it to the landmark
                if !frame.copy_descriptor(feature, &mut descriptors) {
                    return Err(InitError::MissingFeature {
                        landmark,
                        view,
                        feature,
                    });
                }
                landmark_ids.push(landmark);
            }
        }

        info!("Init retrieval database ...");
        let entries: Vec<(D, LandmarkId)> = descriptors.into_iter().zip(landmark_ids).collect();
        info!(
            "Retrieval database initialized: {} landmarks, {} descriptors",
            scene.landmarks.len(),
            entries.len()
        );

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descriptor(&self, index: usize) -> Option<&D> {
        self.entries.get(index).map(|(descriptor, _)| descriptor)
    }

    /// Landmark observed by entry `index`
    pub fn landmark_id(&self, index: usize) -> Option<LandmarkId> {
        self.entries.get(index).map(|&(_, landmark)| landmark)
    }

    pub fn entries(&self) -> &[(D, LandmarkId)] {
        &self.entries
    }

    /// Nearest neighbour view over the stored entries, borrowing them without copying
    pub fn search(&self) -> LinearKnn<D::Metric, std::slice::Iter<'_, (D, LandmarkId)>> {
        KnnFromBatch::from_batch(self.entries.iter())
    }

    /// Match every query feature against the database.
    ///
    /// Find the k = 2 nearest neighbors and then perform Lowe's test to filter out answers
    /// potentially chosen by noise: a match is kept only when the nearest entry is closer than
    /// `ratio` times the second nearest. With a single entry in the database there is no
    /// second candidate and the nearest one is kept.
    /// https://stackoverflow.com/questions/51197091/how-does-the-lowes-ratio-test-work
    ///
    /// Each query feature yields at most one match; matches are ordered by query index.
    pub fn match_frame(
        &self,
        query: &Frame<D>,
        ratio: f32,
    ) -> Result<Vec<PutativeMatch>, MatchError> {
        if query.is_empty() {
            return Err(MatchError::EmptyQuery);
        }
        if self.is_empty() {
            return Err(MatchError::EmptyDatabase);
        }

        let search = self.search();

        Ok(query
            .features
            .iter()
            .enumerate()
            .filter_map(|(i, feature)| {
                let nearest = search.knn(&feature.descriptor, 2);
                let best = nearest.first()?;

                let accepted = match nearest.get(1) {
                    Some(second) => {
                        D::unit_distance(best.0.distance)
                            < ratio * D::unit_distance(second.0.distance)
                    }
                    None => true,
                };

                accepted.then(|| PutativeMatch {
                    query: i,
                    database: best.0.index,
                })
            })
            .collect())
    }
}
