use crate::common::Result;
use image::DynamicImage;

/// Fixed-length face embedding produced by a [`DescriptorExtractor`].
pub type Descriptor = Vec<f32>;

/// Turns a still image or camera frame into a face descriptor.
///
/// `Ok(None)` means the image was processed but held no usable face.
pub trait DescriptorExtractor {
    fn extract(&self, image: &DynamicImage) -> Result<Option<Descriptor>>;
}

impl<T: DescriptorExtractor + ?Sized> DescriptorExtractor for &T {
    fn extract(&self, image: &DynamicImage) -> Result<Option<Descriptor>> {
        (**self).extract(image)
    }
}

impl<T: DescriptorExtractor + ?Sized> DescriptorExtractor for Box<T> {
    fn extract(&self, image: &DynamicImage) -> Result<Option<Descriptor>> {
        (**self).extract(image)
    }
}

/// Euclidean distance. Both descriptors must have the same dimension.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Mean of the per-frame distances between every live descriptor and one reference.
///
/// Returns `None` for an empty live set or when any dimension differs from the reference.
pub fn aggregate_distance(live: &[Descriptor], reference: &[f32]) -> Option<f32> {
    if live.is_empty() || live.iter().any(|d| d.len() != reference.len()) {
        return None;
    }

    let total: f32 = live.iter().map(|d| euclidean_distance(d, reference)).sum();
    Some(total / live.len() as f32)
}

/// Scale a descriptor to unit length. Zero vectors are returned unchanged.
pub fn l2_normalize(mut descriptor: Descriptor) -> Descriptor {
    let norm = descriptor.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut descriptor {
            *value /= norm;
        }
    }
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_is_symmetric_and_zero_on_self() {
        let a = vec![0.1, -0.4, 0.9, 0.25];
        let b = vec![-0.3, 0.2, 0.5, 0.0];

        assert_eq!(euclidean_distance(&a, &b), euclidean_distance(&b, &a));
        assert_eq!(euclidean_distance(&a, &a), 0.0);
    }

    #[test]
    fn test_distance_known_value() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
    }

    #[test]
    fn test_identical_frames_aggregate_like_one_frame() {
        let frame = vec![0.2, 0.4, -0.1];
        let reference = vec![0.0, 0.1, 0.3];

        let single = aggregate_distance(&[frame.clone()], &reference).unwrap();
        let tripled = aggregate_distance(&[frame.clone(), frame.clone(), frame], &reference).unwrap();

        assert!((single - tripled).abs() < 1e-6);
    }

    #[test]
    fn test_aggregate_is_mean_not_min_or_max() {
        let reference = vec![0.0, 0.0];
        let live = vec![vec![1.0, 0.0], vec![3.0, 0.0], vec![0.0, 2.0]];

        assert_eq!(aggregate_distance(&live, &reference), Some(2.0));
    }

    #[test]
    fn test_aggregate_rejects_dimension_mismatch_and_empty_set() {
        assert_eq!(aggregate_distance(&[vec![1.0, 2.0]], &[1.0]), None);
        assert_eq!(aggregate_distance(&[], &[1.0]), None);
    }

    #[test]
    fn test_l2_normalize() {
        let normalized = l2_normalize(vec![3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
