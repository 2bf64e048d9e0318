//! Fit session state.
//! The active board and the working copy of its FitRecord. The controller writes every change
//! back to the store; the session never answers for any board other than its own.
//!
//! Lifecycle: Idle -> Loading (geometry requested) -> Active (geometry ready).
//! Navigating while Loading just replaces the pending load; stale completions are dropped.

use crate::catalog::BoardDescriptor;
use crate::export::ExportError;
use crate::fit::FitRecord;
use crate::store::StorageError;
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("No boards available to fit")]
    NoBoardsAvailable,
    #[error("Frame {index} is not selectable ({available} frames to choose from)")]
    InvalidFrameIndex { index: usize, available: usize },
    #[error("Board assets are still loading")]
    BoardNotReady,
    #[error("No board at catalog index {0}")]
    UnknownBoard(usize),
    #[error("Geometry for board '{id}' failed to load: {reason}")]
    GeometryFailed { id: String, reason: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Identifies one geometry load request; only the latest one may activate a board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FitSession {
    active_index: usize,
    board: BoardDescriptor,
    record: FitRecord,
    frame_count: usize,
}

impl FitSession {
    pub fn new(active_index: usize, board: BoardDescriptor, record: FitRecord, frame_count: usize) -> Self {
        Self {
            active_index,
            board,
            record,
            frame_count,
        }
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn board(&self) -> &BoardDescriptor {
        &self.board
    }

    pub fn record(&self) -> &FitRecord {
        &self.record
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn last_frame_index(&self) -> usize {
        self.frame_count.saturating_sub(1)
    }

    /// Frames offered by the picker: every frame except the last.
    pub fn selectable_frames(&self) -> Range<usize> {
        0..self.last_frame_index()
    }

    /// Resets a persisted frame choice the sheet no longer offers back to frame 0.
    /// Returns whether the record changed.
    pub fn clamp_selected_frame(&mut self) -> bool {
        let frame = self.record.selected_frame;
        if frame == 0 || self.selectable_frames().contains(&frame) {
            return false;
        }
        self.record.selected_frame = 0;
        true
    }

    pub fn toggle_layer(&mut self) {
        self.record.layer = self.record.layer.toggled();
    }

    pub fn toggle_middle(&mut self) {
        self.record.middle_effect = !self.record.middle_effect;
    }

    pub fn select_frame(&mut self, index: usize) -> Result<(), FitError> {
        if !self.selectable_frames().contains(&index) {
            return Err(FitError::InvalidFrameIndex {
                index,
                available: self.selectable_frames().len(),
            });
        }
        self.record.selected_frame = index;
        Ok(())
    }

    /// Absolute placement: pointer position minus the anchor. Offsets saturate at the i32 range.
    pub fn drag_to(&mut self, pointer_x: i32, pointer_y: i32, anchor_x: i32, anchor_y: i32) {
        self.record.offset_x = pointer_x.saturating_sub(anchor_x);
        self.record.offset_y = pointer_y.saturating_sub(anchor_y);
    }

    pub fn nudge(&mut self, dx: i32, dy: i32) {
        self.record.offset_x = self.record.offset_x.saturating_add(dx);
        self.record.offset_y = self.record.offset_y.saturating_add(dy);
    }

    pub fn status_line(&self) -> String {
        format!(
            "Board: {} | Offset: ({}, {}) | Middle: {} | Layer: {}",
            self.board.label(),
            self.record.offset_x,
            self.record.offset_y,
            self.record.middle_effect,
            self.record.layer
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Loading {
        index: usize,
        ticket: LoadTicket,
    },
    Active(FitSession),
}

impl SessionState {
    pub fn active(&self) -> Option<&FitSession> {
        match self {
            SessionState::Active(session) => Some(session),
            _ => None,
        }
    }

    /// Catalog index of the board that is active or being loaded.
    pub fn current_index(&self) -> Option<usize> {
        match self {
            SessionState::Idle => None,
            SessionState::Loading { index, .. } => Some(*index),
            SessionState::Active(session) => Some(session.active_index()),
        }
    }
}
