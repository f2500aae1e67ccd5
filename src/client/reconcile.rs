//! Local actions vs remote room events.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, warn};

use crate::client::history::HistoryStack;
use crate::client::throttle::{Bounds, CursorThrottler};
use crate::codec::{DrawingObject, ObjectId};
use crate::protocol::{ClientEvent, ObjectData, Point, RoomId, ServerEvent, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Drawing,
    /// Joined but the room's existing drawings have not been installed yet.
    AwaitingRemote,
}

#[derive(Debug)]
pub struct Reconciler {
    room:      RoomId,
    user_name: String,
    mode:      Mode,
    canvas:    Vec<DrawingObject>,
    history:   HistoryStack<DrawingObject>,
    throttler: CursorThrottler,
    backlog:   Vec<ServerEvent>,

    cursors:         HashMap<String, Point>,
    remote_viewport: Option<Viewport>,
    peer_count:      usize,
}

impl Reconciler {
    pub fn new(room: impl Into<RoomId>, user_name: impl Into<String>, bounds: Bounds) -> Self {
        Self::with_throttler(room, user_name, CursorThrottler::new(bounds))
    }

    pub fn with_throttler(
        room: impl Into<RoomId>,
        user_name: impl Into<String>,
        throttler: CursorThrottler,
    ) -> Self {
        Self {
            room: room.into(),
            user_name: user_name.into(),
            mode: Mode::Idle,
            canvas: Vec::new(),
            history: HistoryStack::new(),
            throttler,
            backlog: Vec::new(),
            cursors: HashMap::new(),
            remote_viewport: None,
            peer_count: 0,
        }
    }

    /* ---------------- join / hydration ---------------- */

    /// Starts a session: remote events are held back until [`Self::hydrate`].
    pub fn join(&mut self) -> ClientEvent {
        self.mode = Mode::AwaitingRemote;
        self.canvas.clear();
        self.history.clear();
        self.backlog.clear();
        ClientEvent::Join { room: self.room.clone(), user_name: self.user_name.clone() }
    }

    /// Installs the drawings fetched from `/room/{id}/drawings`, then replays
    /// whatever arrived while the fetch was in flight.
    pub fn hydrate(&mut self, drawings: Vec<DrawingObject>) {
        self.canvas = drawings;
        self.mode = Mode::Idle;
        let backlog = std::mem::take(&mut self.backlog);
        debug!(room = %self.room, objects = self.canvas.len(), replay = backlog.len(), "hydrated");
        for ev in backlog {
            self.apply_now(ev);
        }
    }

    /* ---------------- local actions ---------------- */

    /// Pointer down. Only starts a stroke from `Idle` in an editing mode.
    pub fn pointer_down(&mut self, editing: bool) -> bool {
        if editing && self.mode == Mode::Idle {
            self.mode = Mode::Drawing;
            return true;
        }
        false
    }

    /// Pointer up with the finished object. Commits it locally and returns the
    /// `draw` event, or `None` when no stroke was in progress.
    pub fn pointer_up(&mut self, obj: DrawingObject) -> Option<ClientEvent> {
        if self.mode != Mode::Drawing {
            return None;
        }
        self.mode = Mode::Idle;
        self.canvas.push(obj.clone());
        self.history.push(obj.clone());
        Some(ClientEvent::Draw { room: self.room.clone(), path: obj })
    }

    /// Abandons the stroke in progress; nothing is emitted.
    pub fn cancel_stroke(&mut self) {
        if self.mode == Mode::Drawing {
            self.mode = Mode::Idle;
        }
    }

    pub fn undo(&mut self) -> Option<ClientEvent> {
        let obj = self.history.undo()?.clone();
        self.remove_from_canvas(obj.id);
        Some(ClientEvent::Undo { room: self.room.clone(), object_data: Some(ObjectData::Object(obj)) })
    }

    pub fn redo(&mut self) -> Option<ClientEvent> {
        let obj = self.history.redo()?.clone();
        self.add_to_canvas(obj.clone());
        Some(ClientEvent::Redo { room: self.room.clone(), object_data: Some(ObjectData::Object(obj)) })
    }

    pub fn clear(&mut self) -> ClientEvent {
        self.canvas.clear();
        self.history.clear();
        ClientEvent::Clear { room: self.room.clone() }
    }

    pub fn cursor_moved(&mut self, p: Point, now: Instant) -> Option<ClientEvent> {
        self.throttler.sample(p, now).map(|p| self.cursor_event(p))
    }

    /// Timer tick: flushes a throttled cursor position once its window opens.
    pub fn tick(&mut self, now: Instant) -> Option<ClientEvent> {
        self.throttler.poll(now).map(|p| self.cursor_event(p))
    }

    pub fn viewport_changed(&self, viewport: Viewport) -> ClientEvent {
        ClientEvent::ViewportUpdate { room: self.room.clone(), viewport }
    }

    pub fn resize(&mut self, bounds: Bounds) { self.throttler.set_bounds(bounds); }

    fn cursor_event(&self, p: Point) -> ClientEvent {
        ClientEvent::CursorMove { room: self.room.clone(), x: p.x, y: p.y }
    }

    /* ---------------- remote events ---------------- */

    pub fn apply(&mut self, ev: ServerEvent) {
        if self.mode == Mode::AwaitingRemote && touches_drawings(&ev) {
            self.backlog.push(ev);
            return;
        }
        self.apply_now(ev);
    }

    fn apply_now(&mut self, ev: ServerEvent) {
        match ev {
            ServerEvent::DrawUpdate { room, path } => {
                if room == self.room {
                    self.add_to_canvas(path);
                }
            }
            ServerEvent::UndoUpdate { room, object_data } if room == self.room => match object_data {
                Some(data) => {
                    let id = data.id();
                    self.remove_from_canvas(id);
                    // someone else undid one of our strokes; it can no longer be ours to redo
                    self.history.remove_where(|o| o.id == id);
                }
                None => {
                    debug!(room = %self.room, "undo_update without object, dropping newest");
                    self.canvas.pop();
                }
            },
            ServerEvent::RedoUpdate { room, object_data } if room == self.room => match object_data {
                Some(ObjectData::Object(obj)) => self.add_to_canvas(obj),
                Some(ObjectData::Ref { id }) => {
                    warn!(room = %self.room, object = %id, "redo_update without object body");
                }
                None => warn!(room = %self.room, "redo_update without object"),
            },
            ServerEvent::ClearBoard => {
                self.canvas.clear();
                self.history.clear();
            }
            ServerEvent::CursorUpdate { room, user_name, x, y } if room == self.room => {
                self.cursors.insert(user_name, Point::new(x, y));
            }
            ServerEvent::ViewportUpdate { room, viewport } if room == self.room => {
                self.remote_viewport = Some(viewport);
            }
            ServerEvent::UserJoined { count } | ServerEvent::UserLeft { count } => {
                self.peer_count = count;
            }
            ServerEvent::Error { message } => warn!(room = %self.room, %message, "relay error"),
            other => debug!(room = %self.room, event = other.name(), "event for another room"),
        }
    }

    fn add_to_canvas(&mut self, obj: DrawingObject) {
        if !self.canvas.iter().any(|o| o.id == obj.id) {
            self.canvas.push(obj);
        }
    }

    fn remove_from_canvas(&mut self, id: ObjectId) {
        self.canvas.retain(|o| o.id != id);
    }

    /* ---------------- accessors ---------------- */

    pub fn mode(&self) -> Mode { self.mode }
    pub fn room(&self) -> &str { &self.room }
    pub fn canvas(&self) -> &[DrawingObject] { &self.canvas }
    pub fn history(&self) -> &HistoryStack<DrawingObject> { &self.history }
    pub fn cursors(&self) -> &HashMap<String, Point> { &self.cursors }
    pub fn remote_viewport(&self) -> Option<Viewport> { self.remote_viewport }
    pub fn peer_count(&self) -> usize { self.peer_count }
}

fn touches_drawings(ev: &ServerEvent) -> bool {
    matches!(
        ev,
        ServerEvent::DrawUpdate { .. }
            | ServerEvent::UndoUpdate { .. }
            | ServerEvent::RedoUpdate { .. }
            | ServerEvent::ClearBoard
    )
}
