//! Camera registry adapters.

use std::sync::{Arc, RwLock};

use skycal_core::{Camera, CameraId};

/// Read-only access to the camera registry.
pub trait CameraRegistry: Send + Sync {
    /// Cameras eligible for scheduled processing, in registry order.
    fn active_cameras(&self) -> Vec<Camera>;

    fn by_id(&self, id: CameraId) -> Option<Camera>;

    fn by_code(&self, code: &str) -> Option<Camera>;

    fn is_active(&self, id: CameraId) -> bool {
        self.by_id(id).is_some_and(|c| c.active)
    }
}

impl<R> CameraRegistry for Arc<R>
where
    R: CameraRegistry + ?Sized,
{
    fn active_cameras(&self) -> Vec<Camera> {
        (**self).active_cameras()
    }

    fn by_id(&self, id: CameraId) -> Option<Camera> {
        (**self).by_id(id)
    }

    fn by_code(&self, code: &str) -> Option<Camera> {
        (**self).by_code(code)
    }

    fn is_active(&self, id: CameraId) -> bool {
        (**self).is_active(id)
    }
}

/// In-memory registry for tests/dev, also used by the standalone runner.
#[derive(Debug, Default)]
pub struct InMemoryCameraRegistry {
    cameras: RwLock<Vec<Camera>>,
}

impl InMemoryCameraRegistry {
    pub fn new(cameras: Vec<Camera>) -> Self {
        Self {
            cameras: RwLock::new(cameras),
        }
    }

    /// Insert or replace a camera (matched by id).
    pub fn upsert(&self, camera: Camera) {
        if let Ok(mut cameras) = self.cameras.write() {
            match cameras.iter_mut().find(|c| c.id == camera.id) {
                Some(existing) => *existing = camera,
                None => cameras.push(camera),
            }
        }
    }

    pub fn set_active(&self, id: CameraId, active: bool) {
        if let Ok(mut cameras) = self.cameras.write() {
            if let Some(camera) = cameras.iter_mut().find(|c| c.id == id) {
                camera.active = active;
            }
        }
    }

    fn find(&self, pred: impl Fn(&Camera) -> bool) -> Option<Camera> {
        let cameras = self.cameras.read().ok()?;
        cameras.iter().find(|c| pred(c)).cloned()
    }
}

impl CameraRegistry for InMemoryCameraRegistry {
    fn active_cameras(&self) -> Vec<Camera> {
        match self.cameras.read() {
            Ok(cameras) => cameras.iter().filter(|c| c.active).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn by_id(&self, id: CameraId) -> Option<Camera> {
        self.find(|c| c.id == id)
    }

    fn by_code(&self, code: &str) -> Option<Camera> {
        self.find(|c| c.code == code)
    }
}
