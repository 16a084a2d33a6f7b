//! Progress events emitted by the trainer's visualization front-end.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Wire names of the accepted event kinds
pub mod event_types {
    pub const CAMERA: &str = "camera";
    pub const STEP: &str = "step";
}

/// Kind of progress tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A camera view finished rendering; counts toward termination
    Camera,
    /// A training step report; informational only
    Step,
}

/// One framed notification message.
///
/// On the wire: `{"type": "camera", "message": "top_camera.png"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type", alias = "kind")]
    pub kind: EventKind,
    #[serde(rename = "message", alias = "payload", default)]
    pub payload: String,
}

impl ProgressEvent {
    pub fn camera(payload: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Camera,
            payload: payload.into(),
        }
    }

    pub fn step(payload: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Step,
            payload: payload.into(),
        }
    }

    /// Decode one frame body.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(frame)?)
    }

    /// Encode as a frame body.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
