use crate::core::capture::LiveCaptureSet;
use crate::core::descriptor::{aggregate_distance, DescriptorExtractor};
use crate::storage::{ReferenceImageSource, UserRecord};
use tracing::{debug, info, warn};

/// Best-scoring enrolled user for one live capture set.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub user: UserRecord,
    /// Mean Euclidean distance between the live descriptors and the user's reference.
    pub distance: f32,
}

/// Scores live descriptors against each candidate's reference photo.
///
/// Reference descriptors are recomputed on every pass; nothing is cached.
pub struct MatchEngine<'a, X: ?Sized, R: ?Sized> {
    extractor: &'a X,
    images: &'a R,
}

impl<'a, X, R> MatchEngine<'a, X, R>
where
    X: DescriptorExtractor + ?Sized,
    R: ReferenceImageSource + ?Sized,
{
    pub fn new(extractor: &'a X, images: &'a R) -> Self {
        Self { extractor, images }
    }

    /// Candidates are scored one by one in the given order; on equal distance the earlier one wins.
    ///
    /// `None` only when no candidate produced a reference descriptor. The threshold is not applied here.
    pub async fn best_match(&self, live: &LiveCaptureSet, candidates: &[UserRecord]) -> Option<MatchResult> {
        let mut best: Option<MatchResult> = None;
        let mut scored = 0usize;
        let mut skipped = 0usize;

        for user in candidates {
            let Some(face_file) = user.face_image_file.as_deref() else {
                debug!("{} has no reference image", user.email);
                continue;
            };

            let Some(distance) = self.score(live, &user.email, face_file).await else {
                skipped += 1;
                continue;
            };
            scored += 1;
            debug!("{} distance {:.4}", user.email, distance);

            let better = match &best {
                Some(current) => distance < current.distance,
                None => true,
            };
            if better {
                best = Some(MatchResult { user: user.clone(), distance });
            }
        }

        info!(
            "Match pass: {} candidates, {} scored, {} skipped, best {:?}",
            candidates.len(),
            scored,
            skipped,
            best.as_ref().map(|m| (m.user.email.as_str(), m.distance))
        );
        best
    }

    async fn score(&self, live: &LiveCaptureSet, email: &str, face_file: &str) -> Option<f32> {
        let image = match self.images.load(face_file).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Could not load reference image {} for {}: {}", face_file, email, e);
                return None;
            }
        };

        let reference = match self.extractor.extract(&image) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                warn!("No face detected in reference image for {}", email);
                return None;
            }
            Err(e) => {
                warn!("Reference extraction failed for {}: {}", email, e);
                return None;
            }
        };

        let distance = aggregate_distance(live.descriptors(), &reference);
        match distance {
            Some(d) if d.is_finite() => Some(d),
            Some(d) => {
                warn!("Non-finite distance {} for {}", d, email);
                None
            }
            None => {
                warn!(
                    "Reference descriptor for {} has {} dimensions, live has {}",
                    email,
                    reference.len(),
                    live.descriptors()[0].len()
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FaceDashError, Result};
    use crate::core::descriptor::Descriptor;
    use crate::storage::Role;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageBuffer, Luma};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Images are 1x1 with the pixel value as a key into the descriptor table.
    struct TableExtractor(HashMap<u8, Descriptor>);

    impl DescriptorExtractor for TableExtractor {
        fn extract(&self, image: &DynamicImage) -> Result<Option<Descriptor>> {
            let key = image.to_luma8().get_pixel(0, 0)[0];
            Ok(self.0.get(&key).cloned())
        }
    }

    /// File name "<n>.jpg" loads as pixel value n; "broken.jpg" fails.
    #[derive(Default)]
    struct KeyedImages {
        loads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReferenceImageSource for KeyedImages {
        async fn load(&self, face_image_file: &str) -> Result<DynamicImage> {
            self.loads.lock().unwrap().push(face_image_file.to_string());
            let key: u8 = face_image_file
                .trim_end_matches(".jpg")
                .parse()
                .map_err(|_| FaceDashError::Store("unreadable".into()))?;
            Ok(DynamicImage::ImageLuma8(ImageBuffer::from_pixel(1, 1, Luma([key]))))
        }
    }

    fn user(email: &str, face: Option<&str>) -> UserRecord {
        UserRecord {
            email: email.to_string(),
            password_hash: String::new(),
            role: Role::Staff,
            is_blocked: false,
            last_login: None,
            face_image_file: face.map(str::to_string),
        }
    }

    fn live(descriptors: Vec<Descriptor>) -> LiveCaptureSet {
        LiveCaptureSet::new(descriptors).unwrap()
    }

    fn table(entries: &[(u8, Descriptor)]) -> TableExtractor {
        TableExtractor(entries.iter().cloned().collect())
    }

    #[tokio::test]
    async fn test_picks_smallest_mean_distance() {
        let extractor = table(&[(1, vec![1.0, 0.0]), (2, vec![0.1, 0.0])]);
        let images = KeyedImages::default();
        let engine = MatchEngine::new(&extractor, &images);

        let candidates = vec![user("far@x.kh", Some("1.jpg")), user("near@x.kh", Some("2.jpg"))];
        let result = engine
            .best_match(&live(vec![vec![0.0, 0.0], vec![0.2, 0.0]]), &candidates)
            .await
            .unwrap();

        assert_eq!(result.user.email, "near@x.kh");
        assert!((result.distance - 0.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_tie_goes_to_first_candidate() {
        let extractor = table(&[(1, vec![1.0, 0.0]), (2, vec![0.0, 1.0])]);
        let images = KeyedImages::default();
        let engine = MatchEngine::new(&extractor, &images);

        let candidates = vec![user("first@x.kh", Some("1.jpg")), user("second@x.kh", Some("2.jpg"))];
        let result = engine.best_match(&live(vec![vec![0.0, 0.0]]), &candidates).await.unwrap();

        assert_eq!(result.user.email, "first@x.kh");
        assert_eq!(result.distance, 1.0);
    }

    #[tokio::test]
    async fn test_users_without_reference_are_never_loaded_or_selected() {
        let extractor = table(&[(1, vec![5.0])]);
        let images = KeyedImages::default();
        let engine = MatchEngine::new(&extractor, &images);

        let candidates = vec![user("noface@x.kh", None), user("enrolled@x.kh", Some("1.jpg"))];
        let result = engine.best_match(&live(vec![vec![5.0]]), &candidates).await.unwrap();

        assert_eq!(result.user.email, "enrolled@x.kh");
        assert_eq!(*images.loads.lock().unwrap(), vec!["1.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_unextractable_references_are_skipped() {
        // 3 has no table entry (no face), "broken" fails to load, 4 has the wrong dimension
        let extractor = table(&[(1, vec![0.3, 0.4]), (4, vec![0.0])]);
        let images = KeyedImages::default();
        let engine = MatchEngine::new(&extractor, &images);

        let candidates = vec![
            user("noface@x.kh", Some("3.jpg")),
            user("broken@x.kh", Some("broken.jpg")),
            user("wrongdim@x.kh", Some("4.jpg")),
            user("ok@x.kh", Some("1.jpg")),
        ];
        let result = engine.best_match(&live(vec![vec![0.0, 0.0]]), &candidates).await.unwrap();

        assert_eq!(result.user.email, "ok@x.kh");
        assert!((result.distance - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_none_when_no_reference_descriptor() {
        let extractor = table(&[]);
        let images = KeyedImages::default();
        let engine = MatchEngine::new(&extractor, &images);

        let candidates = vec![user("only@x.kh", Some("7.jpg")), user("noface@x.kh", None)];
        assert!(engine.best_match(&live(vec![vec![0.0]]), &candidates).await.is_none());
        assert!(engine.best_match(&live(vec![vec![0.0]]), &[]).await.is_none());
    }

    #[tokio::test]
    async fn test_returns_best_even_above_any_threshold() {
        let extractor = table(&[(1, vec![10.0])]);
        let images = KeyedImages::default();
        let engine = MatchEngine::new(&extractor, &images);

        let result = engine
            .best_match(&live(vec![vec![0.0]]), &[user("far@x.kh", Some("1.jpg"))])
            .await
            .unwrap();
        assert_eq!(result.distance, 10.0);
    }
}
