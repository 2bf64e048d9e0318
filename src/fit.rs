//! Fit record module.
//! One record per board id: where the board sits relative to the avatar anchor,
//! which frame is shown, and how it is layered against the avatar parts.
//! Serialized field names match the persisted/exported JSON document (camelCase, "above"/"below").

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether the board (or its front slice in middle mode) renders above or below the avatar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    #[default]
    Above,
    Below,
}

impl Layer {
    pub fn toggled(self) -> Self {
        match self {
            Layer::Above => Layer::Below,
            Layer::Below => Layer::Above,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Above => write!(f, "above"),
            Layer::Below => write!(f, "below"),
        }
    }
}

/// Calibration for a single board.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitRecord {
    pub offset_x: i32,
    pub offset_y: i32,
    pub middle_effect: bool,
    pub layer: Layer,
    // Older result files were written before frame picking existed
    #[serde(default)]
    pub selected_frame: usize,
}
