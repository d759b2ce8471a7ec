use bitarray::BitArray;
use nalgebra::Vector2;
use space::Metric;

/// Packed binary descriptor (BRIEF, ORB, AKAZE...) compared by Hamming distance
pub type BinaryDescriptor<const N: usize> = [u8; N];
/// Real valued descriptor (SIFT, SURF...) compared by Euclidean distance
pub type FloatDescriptor<const N: usize> = [f32; N];

/// Capabilities the correspondence database needs from a descriptor type
///
/// Every descriptor of a database shares a single concrete type, so the metric is
/// chosen statically rather than by inspecting a sample.
pub trait Descriptor: Clone + PartialEq {
    /// Nearest neighbour metric. Units must grow monotonically with the distance.
    type Metric: Metric<Self, Unit = u32> + Default;

    /// Convert a metric unit back into a distance that ratios can be taken of
    fn unit_distance(unit: u32) -> f32;
}

/// Hamming distance between bit strings
#[derive(Debug, Default, Clone, Copy)]
pub struct Hamming;

impl<const N: usize> Metric<BinaryDescriptor<N>> for Hamming {
    type Unit = u32;
    fn distance(&self, a: &BinaryDescriptor<N>, b: &BinaryDescriptor<N>) -> Self::Unit {
        BitArray::new(*a).distance(&BitArray::new(*b))
    }
}

impl<const N: usize> Descriptor for BinaryDescriptor<N> {
    type Metric = Hamming;

    fn unit_distance(unit: u32) -> f32 {
        unit as f32
    }
}

/// Euclidean (L2) distance
///
/// The distance is a non-negative `f32`, whose bit pattern orders the same way
/// as its value, so it is handed to `space` as raw bits.
#[derive(Debug, Default, Clone, Copy)]
pub struct Euclidean;

impl<const N: usize> Metric<FloatDescriptor<N>> for Euclidean {
    type Unit = u32;
    fn distance(&self, a: &FloatDescriptor<N>, b: &FloatDescriptor<N>) -> Self::Unit {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
            .to_bits()
    }
}

impl<const N: usize> Descriptor for FloatDescriptor<N> {
    type Metric = Euclidean;

    fn unit_distance(unit: u32) -> f32 {
        f32::from_bits(unit)
    }
}

/// Feature object which holds a coordinate/pixel on an image
/// and tries to handle a generic descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Feature<D> {
    pub keypoint: Vector2<f64>,
    pub descriptor: D,
}

impl<D> Feature<D> {
    pub fn new(keypoint: Vector2<f64>, descriptor: D) -> Self {
        Self {
            keypoint,
            descriptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_counts_differing_bits() {
        let a: BinaryDescriptor<4> = [0b1010_1010, 0, 0xff, 1];
        let b: BinaryDescriptor<4> = [0b1010_1011, 0, 0x0f, 1];
        assert_eq!(Hamming.distance(&a, &b), 5);
        assert_eq!(Hamming.distance(&a, &a), 0);
        assert_eq!(BinaryDescriptor::<4>::unit_distance(5), 5.0);
    }

    #[test]
    fn euclidean_units_round_trip_to_distance() {
        let a: FloatDescriptor<3> = [0.0, 0.0, 0.0];
        let b: FloatDescriptor<3> = [3.0, 4.0, 0.0];
        let unit = Euclidean.distance(&a, &b);
        assert_eq!(FloatDescriptor::<3>::unit_distance(unit), 5.0);
    }

    #[test]
    fn feature_keeps_keypoint_and_descriptor() {
        let feature = Feature::new(Vector2::new(12.5, -3.0), [0xa5u8; 8]);
        assert_eq!(feature.keypoint, Vector2::new(12.5, -3.0));
        assert_eq!(Hamming.distance(&feature.descriptor, &[0x5a; 8]), 64);
    }

    #[test]
    fn euclidean_units_preserve_order() {
        let origin: FloatDescriptor<2> = [0.0, 0.0];
        let near = Euclidean.distance(&origin, &[0.1, 0.2]);
        let far = Euclidean.distance(&origin, &[1.5, -2.0]);
        let farther = Euclidean.distance(&origin, &[100.0, 0.0]);
        assert!(near < far && far < farther);
    }
}
