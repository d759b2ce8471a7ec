use std::collections::BTreeMap;

use nalgebra::Vector2;

use crate::localization::{feature::Feature, scene::ViewId};

/// Ordered set of features extracted from a single image
///
/// Used both for the views of the reconstruction and for the query image.
/// Feature indices are positions in `features`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<D> {
    pub features: Vec<Feature<D>>,
}

impl<D> Default for Frame<D> {
    fn default() -> Self {
        Self {
            features: Vec::new(),
        }
    }
}

/// Features of every reconstructed view, by view
pub type ViewFrames<D> = BTreeMap<ViewId, Frame<D>>;

impl<D> Frame<D> {
    pub fn new(features: Vec<Feature<D>>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Pixel position of a feature
    pub fn position(&self, index: usize) -> Option<Vector2<f64>> {
        self.features.get(index).map(|feature| feature.keypoint)
    }

    pub fn descriptor(&self, index: usize) -> Option<&D> {
        self.features.get(index).map(|feature| &feature.descriptor)
    }
}

impl<D: Clone> Frame<D> {
    /// Append a copy of one descriptor to `accumulator`, returning whether `index` existed
    pub fn copy_descriptor(&self, index: usize, accumulator: &mut Vec<D>) -> bool {
        match self.descriptor(index) {
            Some(descriptor) => {
                accumulator.push(descriptor.clone());
                true
            }
            None => false,
        }
    }
}

impl<D> FromIterator<Feature<D>> for Frame<D> {
    fn from_iter<I: IntoIterator<Item = Feature<D>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::feature::BinaryDescriptor;

    fn frame() -> Frame<BinaryDescriptor<2>> {
        (0..3u8)
            .map(|i| Feature::new(Vector2::new(i as f64, 2.0 * i as f64), [i, 0xff - i]))
            .collect()
    }

    #[test]
    fn copy_descriptor_appends_in_order() {
        let frame = frame();
        let mut accumulator = vec![[9, 9]];
        assert!(frame.copy_descriptor(2, &mut accumulator));
        assert!(frame.copy_descriptor(0, &mut accumulator));
        assert_eq!(accumulator, vec![[9, 9], [2, 0xfd], [0, 0xff]]);
    }

    #[test]
    fn copy_descriptor_out_of_range() {
        let mut accumulator = Vec::new();
        assert!(!frame().copy_descriptor(3, &mut accumulator));
        assert!(accumulator.is_empty());
    }

    #[test]
    fn positions() {
        let frame = frame();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.position(1), Some(Vector2::new(1.0, 2.0)));
        assert_eq!(frame.position(7), None);
    }
}
