//! Compositing policy.
//! Decides what the renderer must draw for the active board: which frame(s), where, and in which
//! z-order relative to the avatar parts. Nothing here touches pixels.
//!
//! Middle effect ("sandwich"): two copies of the board, frame 0 and frame `lastFrameIndex - 1`.
//! With `Layer::Above` frame 0 goes behind the avatar and `lastFrameIndex - 1` in front;
//! `Layer::Below` swaps the two. The stack is always board-behind < avatar < board-front.
//! Otherwise a single sprite at `selectedFrame` goes above or below the avatar per `layer`.

use crate::fit::Layer;
use crate::session::FitSession;
use serde::{Deserialize, Serialize};

/// Fixed point the avatar composite is drawn around; offsets are relative to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub x: i32,
    pub y: i32,
}

impl Default for Anchor {
    fn default() -> Self {
        Self { x: 400, y: 300 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawPlan {
    Single { frame: usize, layer: Layer },
    Sandwich { behind: usize, front: usize },
}

/// One entry of the draw stack, bottom first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackItem {
    Board { frame: usize },
    Avatar,
}

impl DrawPlan {
    pub fn for_session(session: &FitSession) -> Self {
        let record = session.record();
        let last_frame_index = session.last_frame_index();

        if record.middle_effect && last_frame_index > 0 {
            // Only meaningful for 2-3 frame sheets; larger sheets get the same pair
            let (behind, front) = match record.layer {
                Layer::Above => (0, last_frame_index - 1),
                Layer::Below => (last_frame_index - 1, 0),
            };
            DrawPlan::Sandwich { behind, front }
        } else {
            DrawPlan::Single {
                frame: record.selected_frame,
                layer: record.layer,
            }
        }
    }

    /// Z-order, bottom to top.
    pub fn stack(&self) -> Vec<StackItem> {
        match *self {
            DrawPlan::Sandwich { behind, front } => vec![
                StackItem::Board { frame: behind },
                StackItem::Avatar,
                StackItem::Board { frame: front },
            ],
            DrawPlan::Single { frame, layer: Layer::Above } => {
                vec![StackItem::Avatar, StackItem::Board { frame }]
            }
            DrawPlan::Single { frame, layer: Layer::Below } => {
                vec![StackItem::Board { frame }, StackItem::Avatar]
            }
        }
    }
}

/// Everything the renderer needs for the active board.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardDraw {
    pub board_id: String,
    pub x: i32,
    pub y: i32,
    pub plan: DrawPlan,
    /// Frames offered by the frame picker: all but the last one.
    pub thumbnails: Vec<usize>,
}

impl BoardDraw {
    pub fn new(session: &FitSession, anchor: Anchor) -> Self {
        let record = session.record();
        Self {
            board_id: session.board().id.clone(),
            x: anchor.x.saturating_add(record.offset_x),
            y: anchor.y.saturating_add(record.offset_y),
            plan: DrawPlan::for_session(session),
            thumbnails: session.selectable_frames().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BoardDescriptor;
    use crate::fit::FitRecord;

    fn session(frame_count: usize, record: FitRecord) -> FitSession {
        let board = BoardDescriptor {
            id: "oak".to_string(),
            path: "oak.png".to_string(),
            split_x: 100,
            split_y: 36,
        };
        FitSession::new(0, board, record, frame_count)
    }

    fn middle(layer: Layer) -> FitRecord {
        FitRecord {
            middle_effect: true,
            layer,
            ..FitRecord::default()
        }
    }

    #[test]
    fn test_sandwich_above_uses_first_behind() {
        // lastFrameIndex = 3
        let plan = DrawPlan::for_session(&session(4, middle(Layer::Above)));
        assert_eq!(plan, DrawPlan::Sandwich { behind: 0, front: 2 });
    }

    #[test]
    fn test_sandwich_below_swaps_frames_keeps_order() {
        let plan = DrawPlan::for_session(&session(4, middle(Layer::Below)));
        assert_eq!(plan, DrawPlan::Sandwich { behind: 2, front: 0 });
        assert_eq!(
            plan.stack(),
            vec![
                StackItem::Board { frame: 2 },
                StackItem::Avatar,
                StackItem::Board { frame: 0 },
            ]
        );
    }

    #[test]
    fn test_middle_ignored_for_single_frame_board() {
        let plan = DrawPlan::for_session(&session(1, middle(Layer::Above)));
        assert_eq!(plan, DrawPlan::Single { frame: 0, layer: Layer::Above });
    }

    #[test]
    fn test_single_frame_layering() {
        let above = FitRecord {
            selected_frame: 1,
            ..FitRecord::default()
        };
        let plan = DrawPlan::for_session(&session(3, above));
        assert_eq!(plan.stack(), vec![StackItem::Avatar, StackItem::Board { frame: 1 }]);

        let below = FitRecord {
            layer: Layer::Below,
            ..FitRecord::default()
        };
        let plan = DrawPlan::for_session(&session(3, below));
        assert_eq!(plan.stack(), vec![StackItem::Board { frame: 0 }, StackItem::Avatar]);
    }

    #[test]
    fn test_board_draw_position_and_thumbnails() {
        let record = FitRecord {
            offset_x: -12,
            offset_y: 7,
            ..FitRecord::default()
        };
        let draw = BoardDraw::new(&session(3, record), Anchor::default());
        assert_eq!((draw.x, draw.y), (388, 307));
        assert_eq!(draw.thumbnails, vec![0, 1]);
    }

    #[test]
    fn test_board_draw_position_saturates() {
        let record = FitRecord {
            offset_x: i32::MAX,
            offset_y: i32::MIN,
            ..FitRecord::default()
        };
        let draw = BoardDraw::new(&session(3, record), Anchor { x: 400, y: -300 });
        assert_eq!((draw.x, draw.y), (i32::MAX, i32::MIN));
    }
}
