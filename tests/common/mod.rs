#![allow(dead_code)]

use async_trait::async_trait;
use facedash::common::{FaceDashError, Result};
use facedash::core::{Descriptor, DescriptorExtractor, FrameSource};
use facedash::storage::{ReferenceImageSource, Role, UserPatch, UserRecord, UserStore};
use image::{DynamicImage, ImageBuffer, Luma};
use std::collections::HashMap;
use std::sync::Mutex;

/// A 1x1 grayscale image carrying `key` as its only pixel.
pub fn keyed_image(key: u8) -> DynamicImage {
    DynamicImage::ImageLuma8(ImageBuffer::from_pixel(1, 1, Luma([key])))
}

/// Camera that hands out keyed frames in order. `stall_after` makes later grabs hang.
pub struct FakeCamera {
    frames: Vec<u8>,
    pub grabs: usize,
    pub acquired: bool,
    pub releases: usize,
    pub stall_after: Option<usize>,
}

impl FakeCamera {
    pub fn new(frames: Vec<u8>) -> Self {
        Self { frames, grabs: 0, acquired: false, releases: 0, stall_after: None }
    }
}

#[async_trait]
impl FrameSource for FakeCamera {
    async fn acquire(&mut self) -> Result<()> {
        self.acquired = true;
        Ok(())
    }

    async fn grab(&mut self) -> Result<DynamicImage> {
        if self.stall_after.is_some_and(|n| self.grabs >= n) {
            std::future::pending::<()>().await;
        }
        let key = *self
            .frames
            .get(self.grabs)
            .ok_or_else(|| FaceDashError::Camera("out of frames".into()))?;
        self.grabs += 1;
        Ok(keyed_image(key))
    }

    fn release(&mut self) {
        self.acquired = false;
        self.releases += 1;
    }
}

/// Looks the image key up in a table; unknown keys have no face.
pub struct KeyedExtractor(HashMap<u8, Descriptor>);

impl KeyedExtractor {
    pub fn new(entries: &[(u8, Descriptor)]) -> Self {
        Self(entries.iter().cloned().collect())
    }
}

impl DescriptorExtractor for KeyedExtractor {
    fn extract(&self, image: &DynamicImage) -> Result<Option<Descriptor>> {
        let key = image.to_luma8().get_pixel(0, 0)[0];
        Ok(self.0.get(&key).cloned())
    }
}

/// Reference photos by file name.
#[derive(Default)]
pub struct FakeImages(HashMap<String, u8>);

impl FakeImages {
    pub fn with(mut self, file: &str, key: u8) -> Self {
        self.0.insert(file.to_string(), key);
        self
    }
}

#[async_trait]
impl ReferenceImageSource for FakeImages {
    async fn load(&self, face_image_file: &str) -> Result<DynamicImage> {
        self.0
            .get(face_image_file)
            .map(|key| keyed_image(*key))
            .ok_or_else(|| FaceDashError::Store(format!("{} not found", face_image_file)))
    }
}

/// Reference source whose downloads never finish.
pub struct StalledImages;

#[async_trait]
impl ReferenceImageSource for StalledImages {
    async fn load(&self, _face_image_file: &str) -> Result<DynamicImage> {
        std::future::pending().await
    }
}

/// In-memory users sheet that records every call.
#[derive(Default)]
pub struct FakeStore {
    users: Vec<UserRecord>,
    pub list_calls: Mutex<usize>,
    pub updates: Mutex<Vec<(String, UserPatch)>>,
    pub fail_updates: bool,
    pub fail_list: bool,
}

impl FakeStore {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self { users, ..Default::default() }
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    pub fn updates(&self) -> Vec<(String, UserPatch)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserStore for FakeStore {
    async fn list(&self) -> Result<Vec<UserRecord>> {
        *self.list_calls.lock().unwrap() += 1;
        if self.fail_list {
            return Err(FaceDashError::Store("sheet unreachable".into()));
        }
        Ok(self.users.clone())
    }

    async fn update(&self, email: &str, patch: &UserPatch) -> Result<()> {
        self.updates.lock().unwrap().push((email.to_string(), patch.clone()));
        if self.fail_updates {
            return Err(FaceDashError::Store("write rejected".into()));
        }
        Ok(())
    }
}

pub fn user(email: &str, face: Option<&str>) -> UserRecord {
    UserRecord {
        email: email.to_string(),
        password_hash: String::new(),
        role: Role::Staff,
        is_blocked: false,
        last_login: None,
        face_image_file: face.map(str::to_string),
    }
}
