//! Interaction controller.
//! Turns semantic commands (next, toggle layer, drag, ...) into FitSession mutations, writes each
//! change straight through to the FitResultStore, and tells the rendering adapter what to draw.
//! Everything runs on one logical actor: callers marshal input and load completions onto it.

use crate::catalog::{BoardCatalog, BoardDescriptor};
use crate::compose::{Anchor, BoardDraw};
use crate::export::ExportService;
use crate::fit::FitRecord;
use crate::session::{FitError, FitSession, LoadTicket, SessionState};
use crate::store::FitResultStore;
use tracing::{debug, info, warn};

/// Operator commands, independent of keybindings or pointer devices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    /// Jump straight to a catalog index (board picker).
    SelectBoard(usize),
    ToggleMiddle,
    ToggleLayer,
    Save,
    ExportCurrent,
    ExportAll,
    ExportBatch,
    /// Absolute pointer position.
    Drag { x: i32, y: i32 },
    SelectFrame(usize),
    Nudge { dx: i32, dy: i32 },
}

/// Everything the session actor reacts to.
#[derive(Debug)]
pub enum AppEvent {
    Command(Command),
    /// Status request from the operator.
    Info,
    GeometryLoaded {
        ticket: LoadTicket,
        id: String,
        frame_count: usize,
    },
    GeometryFailed {
        ticket: LoadTicket,
        reason: String,
    },
    Quit,
}

/// What the rendering/asset layer must provide.
pub trait BoardAdapter {
    /// Starts fetching the board's sprite sheet; completion is reported back with the same ticket.
    fn load_geometry(&mut self, ticket: LoadTicket, board: &BoardDescriptor);
    /// Caches a finished load, stale or not, so revisiting the board skips the fetch.
    fn geometry_loaded(&mut self, id: &str, frame_count: usize);
    /// Frame count of a loaded board.
    fn frame_count(&self, id: &str) -> Option<usize>;
    fn draw(&mut self, draw: &BoardDraw);
    fn dispose(&mut self, id: &str);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Loading(LoadTicket),
    Updated,
    Saved,
    Exported(String),
    Batch(Vec<(String, FitRecord)>),
}

/// Result of dispatching one event on the session actor.
#[derive(Debug)]
pub enum Step {
    /// `None` when the event produced no command outcome (status requests, load completions).
    Continue(Result<Option<Outcome>, FitError>),
    Quit,
}

pub struct InteractionController<A: BoardAdapter> {
    catalog: BoardCatalog,
    store: FitResultStore,
    exporter: ExportService,
    adapter: A,
    anchor: Anchor,
    state: SessionState,
    next_ticket: u64,
}

impl<A: BoardAdapter> InteractionController<A> {
    pub fn new(
        catalog: BoardCatalog,
        store: FitResultStore,
        exporter: ExportService,
        adapter: A,
        anchor: Anchor,
    ) -> Self {
        Self {
            catalog,
            store,
            exporter,
            adapter,
            anchor,
            state: SessionState::Idle,
            next_ticket: 0,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn store(&self) -> &FitResultStore {
        &self.store
    }

    #[cfg(test)]
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    #[cfg(test)]
    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn status_line(&self) -> String {
        match &self.state {
            SessionState::Idle => "No board active".to_string(),
            SessionState::Loading { index, .. } => match self.catalog.get(*index) {
                Some(board) => format!("Loading {}...", board.label()),
                None => "Loading...".to_string(),
            },
            SessionState::Active(session) => session.status_line(),
        }
    }

    /// Requests the first board.
    pub fn start(&mut self) -> Result<LoadTicket, FitError> {
        self.begin_load(0)
    }

    pub fn handle(&mut self, command: Command) -> Result<Outcome, FitError> {
        debug!(?command, "Handling command");
        match command {
            Command::Next => self.navigate(1).map(Outcome::Loading),
            Command::Previous => self.navigate(-1).map(Outcome::Loading),
            Command::SelectBoard(index) => {
                if index >= self.catalog.len() {
                    return Err(FitError::UnknownBoard(index));
                }
                self.begin_load(index).map(Outcome::Loading)
            }
            Command::ToggleMiddle => self.edit(|s| {
                s.toggle_middle();
                Ok(())
            }),
            Command::ToggleLayer => self.edit(|s| {
                s.toggle_layer();
                Ok(())
            }),
            Command::SelectFrame(index) => self.edit(|s| s.select_frame(index)),
            Command::Drag { x, y } => {
                let anchor = self.anchor;
                self.edit(|s| {
                    s.drag_to(x, y, anchor.x, anchor.y);
                    Ok(())
                })
            }
            Command::Nudge { dx, dy } => self.edit(|s| {
                s.nudge(dx, dy);
                Ok(())
            }),
            Command::Save => {
                self.store.save()?;
                Ok(Outcome::Saved)
            }
            Command::ExportCurrent => {
                let session = self.active()?;
                let id = session.board().id.clone();
                let location = self.exporter.export_one(&self.store, &id)?;
                Ok(Outcome::Exported(location))
            }
            Command::ExportAll => {
                let location = self.exporter.export_all(&self.store)?;
                Ok(Outcome::Exported(location))
            }
            Command::ExportBatch => Ok(Outcome::Batch(
                self.exporter.export_batch(&self.catalog, &self.store),
            )),
        }
    }

    /// Routes one actor event. Load completions reach the adapter cache before the controller
    /// looks at the ticket, so a superseded load still saves the next visit a fetch.
    pub fn dispatch(&mut self, event: AppEvent) -> Step {
        let result = match event {
            AppEvent::Command(command) => self.handle(command).map(Some),
            AppEvent::Info => Ok(None),
            AppEvent::GeometryLoaded {
                ticket,
                id,
                frame_count,
            } => {
                self.adapter.geometry_loaded(&id, frame_count);
                self.geometry_ready(ticket).map(|_| None)
            }
            AppEvent::GeometryFailed { ticket, reason } => {
                self.geometry_failed(ticket, &reason).map(|_| None)
            }
            AppEvent::Quit => return Step::Quit,
        };
        Step::Continue(result)
    }

    /// Board assets for `ticket` are ready. Returns false when the completion is stale.
    pub fn geometry_ready(&mut self, ticket: LoadTicket) -> Result<bool, FitError> {
        let index = match self.state {
            SessionState::Loading { index, ticket: pending } if pending == ticket => index,
            _ => {
                debug!(?ticket, "Ignoring stale geometry completion");
                return Ok(false);
            }
        };

        let board = self
            .catalog
            .get(index)
            .cloned()
            .ok_or(FitError::UnknownBoard(index))?;
        let frame_count = self
            .adapter
            .frame_count(&board.id)
            .ok_or_else(|| FitError::GeometryFailed {
                id: board.id.clone(),
                reason: "adapter reported no frames".to_string(),
            })?;

        let record = self.store.get(&board.id);
        let mut session = FitSession::new(index, board, record, frame_count);
        if session.clamp_selected_frame() {
            warn!(
                board = %session.board().id,
                frames = session.frame_count(),
                "Stored frame choice is out of range, reset to frame 0"
            );
            self.store.set(&session.board().id, session.record().clone());
        }
        self.adapter.draw(&BoardDraw::new(&session, self.anchor));
        info!("{}", session.status_line());
        self.state = SessionState::Active(session);
        Ok(true)
    }

    /// Board assets for `ticket` could not be loaded. Stale failures are ignored.
    pub fn geometry_failed(&mut self, ticket: LoadTicket, reason: &str) -> Result<(), FitError> {
        let index = match self.state {
            SessionState::Loading { index, ticket: pending } if pending == ticket => index,
            _ => return Ok(()),
        };
        let id = self
            .catalog
            .get(index)
            .map(|b| b.id.clone())
            .unwrap_or_default();
        warn!(board = %id, "Board geometry failed to load: {}", reason);
        Err(FitError::GeometryFailed {
            id,
            reason: reason.to_string(),
        })
    }

    fn navigate(&mut self, step: isize) -> Result<LoadTicket, FitError> {
        let count = self.catalog.len();
        if count == 0 {
            return Err(FitError::NoBoardsAvailable);
        }
        let Some(current) = self.state.current_index() else {
            return self.begin_load(0);
        };
        let next = (current as isize + step).rem_euclid(count as isize) as usize;
        self.begin_load(next)
    }

    fn begin_load(&mut self, index: usize) -> Result<LoadTicket, FitError> {
        if self.catalog.is_empty() {
            return Err(FitError::NoBoardsAvailable);
        }
        let board = self
            .catalog
            .get(index)
            .ok_or(FitError::UnknownBoard(index))?;

        if let SessionState::Active(previous) = &self.state {
            self.adapter.dispose(&previous.board().id);
        }

        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        self.state = SessionState::Loading { index, ticket };
        self.adapter.load_geometry(ticket, board);
        Ok(ticket)
    }

    fn active(&self) -> Result<&FitSession, FitError> {
        self.state.active().ok_or(FitError::BoardNotReady)
    }

    /// Applies a mutation to the active session, then writes through and redraws.
    fn edit(
        &mut self,
        mutate: impl FnOnce(&mut FitSession) -> Result<(), FitError>,
    ) -> Result<Outcome, FitError> {
        let SessionState::Active(session) = &mut self.state else {
            return Err(FitError::BoardNotReady);
        };
        mutate(session)?;
        self.store.set(&session.board().id, session.record().clone());
        self.adapter.draw(&BoardDraw::new(session, self.anchor));
        Ok(Outcome::Updated)
    }
}
