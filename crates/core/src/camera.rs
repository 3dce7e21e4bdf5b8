//! Observation cameras, as seen from the calibration scheduler.

use serde::{Deserialize, Serialize};

use crate::id::{CameraId, UserId};

/// A registry entry for one observation camera.
///
/// Read-only from the scheduler's point of view: the registry owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Camera {
    pub id: CameraId,
    /// Station code, e.g. `ITPI01`. Names capture and artifact directories.
    pub code: String,
    pub active: bool,
    /// User the nightly job runs for.
    pub owner: UserId,
}

impl Camera {
    pub fn new(id: CameraId, code: impl Into<String>, owner: UserId) -> Self {
        Self {
            id,
            code: code.into(),
            active: true,
            owner,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}
