//! Terminal adapter.
//! Stands in for the sprite renderer: reads board sheet dimensions with `image` on tokio's blocking
//! pool, reports completions back to the session actor, and prints what would be drawn.
//! Frame count of a sheet = (width / splitX) * (height / splitY) slices, row-major like any
//! spritesheet, plus the whole-texture base frame the engine always adds.

use crate::catalog::BoardDescriptor;
use crate::compose::{BoardDraw, StackItem};
use crate::controller::{AppEvent, BoardAdapter};
use crate::session::LoadTicket;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Frames the sprite engine registers for a sheet: every whole `split_x x split_y` slice plus the
/// base frame covering the whole texture. A two-slice sheet therefore has three frames.
pub fn frame_count(width: u32, height: u32, split_x: u32, split_y: u32) -> Result<usize> {
    if split_x == 0 || split_y == 0 {
        bail!("Frame geometry must be positive, got {}x{}", split_x, split_y);
    }
    let slices = (width / split_x) as usize * (height / split_y) as usize;
    if slices == 0 {
        bail!(
            "Sheet {}x{} is smaller than one {}x{} frame",
            width, height, split_x, split_y
        );
    }
    Ok(slices + 1)
}

fn read_frame_count(path: &Path, split_x: u32, split_y: u32) -> Result<usize> {
    let (width, height) = image::image_dimensions(path)
        .with_context(|| format!("Failed to read board sheet {}", path.display()))?;
    frame_count(width, height, split_x, split_y)
}

pub struct TerminalAdapter {
    assets_root: PathBuf,
    events: UnboundedSender<AppEvent>,
    frames: HashMap<String, usize>,
}

impl TerminalAdapter {
    pub fn new(assets_root: impl Into<PathBuf>, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            assets_root: assets_root.into(),
            events,
            frames: HashMap::new(),
        }
    }
}

impl BoardAdapter for TerminalAdapter {
    fn load_geometry(&mut self, ticket: LoadTicket, board: &BoardDescriptor) {
        let events = self.events.clone();
        let id = board.id.clone();

        if let Some(&frame_count) = self.frames.get(&id) {
            let _ = events.send(AppEvent::GeometryLoaded {
                ticket,
                id,
                frame_count,
            });
            return;
        }

        let path = self.assets_root.join(&board.path);
        let (split_x, split_y) = board.geometry();
        debug!(board = %id, path = %path.display(), "Loading board sheet");

        tokio::task::spawn_blocking(move || {
            let event = match read_frame_count(&path, split_x, split_y) {
                Ok(frame_count) => AppEvent::GeometryLoaded {
                    ticket,
                    id,
                    frame_count,
                },
                Err(e) => AppEvent::GeometryFailed {
                    ticket,
                    reason: format!("{:#}", e),
                },
            };
            // Receiver gone means the session already ended
            let _ = events.send(event);
        });
    }

    fn geometry_loaded(&mut self, id: &str, frame_count: usize) {
        self.frames.insert(id.to_string(), frame_count);
    }

    fn frame_count(&self, id: &str) -> Option<usize> {
        self.frames.get(id).copied()
    }

    fn draw(&mut self, draw: &BoardDraw) {
        let stack: Vec<String> = draw
            .plan
            .stack()
            .iter()
            .map(|item| match item {
                StackItem::Board { frame } => format!("board#{frame}"),
                StackItem::Avatar => "avatar".to_string(),
            })
            .collect();
        println!(
            "Draw {} at ({}, {}): {} | frames to pick: {:?}",
            draw.board_id,
            draw.x,
            draw.y,
            stack.join(" < "),
            draw.thumbnails
        );
    }

    fn dispose(&mut self, id: &str) {
        debug!(board = id, "Disposing board sprites");
    }
}
