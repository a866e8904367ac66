//! Undo/redo history and the history-aware editor facade.
//!
//! History is snapshot based: every undo step stores a structural copy of
//! the whole [`CanvasState`] (overlay included). Drag gestures are batched
//! so a drag of many frames is undone in one step.

use crate::config::EditorConfig;
use crate::controller::{EditorController, TextPatcher};
use crate::input::InputEvent;
use crate::shortcuts::{ShortcutAction, ShortcutMap};
use crate::sync::{CanvasMutation, SyncEngine};
use crate::tools::FreehandTool;
use trellis_core::canvas::CanvasState;
use trellis_core::{CanvasId, ElementId, Point};

pub type HistorySnapshot = CanvasState;

// ─── History ─────────────────────────────────────────────────────────────

/// Linear undo/redo stacks of canvas snapshots.
pub struct History {
    undo_stack: Vec<HistorySnapshot>,
    redo_stack: Vec<HistorySnapshot>,
    max_depth: usize,
}

impl History {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::with_capacity(max_depth),
            redo_stack: Vec::new(),
            max_depth,
        }
    }

    /// Record the state before a change. Clears the redo stack.
    pub fn push(&mut self, snapshot: HistorySnapshot) {
        self.push_undo(snapshot);
        self.redo_stack.clear();
    }

    /// Step back. `current` becomes the redo target.
    pub fn undo(&mut self, current: HistorySnapshot) -> Option<HistorySnapshot> {
        let previous = self.undo_stack.pop()?;
        self.redo_stack.push(current);
        Some(previous)
    }

    /// Step forward. `current` becomes the undo target.
    pub fn redo(&mut self, current: HistorySnapshot) -> Option<HistorySnapshot> {
        let next = self.redo_stack.pop()?;
        self.push_undo(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn push_undo(&mut self, snapshot: HistorySnapshot) {
        self.undo_stack.push(snapshot);
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.remove(0);
        }
    }
}

// ─── Editor ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanvasMode {
    #[default]
    Select,
    Draw,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub nodes: Vec<CanvasId>,
    pub edges: Vec<CanvasId>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }
}

/// A [`SyncEngine`] paired with undo history, selection and the freehand tool.
///
/// Reconciliation passes go straight to `engine`; they follow the text and
/// are not undo steps.
pub struct Editor {
    pub engine: SyncEngine,
    pub selection: Selection,
    history: History,
    mode: CanvasMode,
    freehand: FreehandTool,
    zoom: f64,
    /// Nesting depth of the current gesture (0 = none).
    gesture_depth: usize,
    gesture_snapshot: Option<HistorySnapshot>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        Self::with_engine(SyncEngine::new(config))
    }

    pub fn with_engine(engine: SyncEngine) -> Self {
        let history = History::new(engine.config().history_depth);
        let freehand = FreehandTool::new(engine.config());
        Self {
            history,
            freehand,
            engine,
            selection: Selection::default(),
            mode: CanvasMode::Select,
            zoom: 1.0,
            gesture_depth: 0,
            gesture_snapshot: None,
        }
    }

    pub fn mode(&self) -> CanvasMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CanvasMode) {
        if mode != CanvasMode::Draw {
            self.freehand.cancel();
        }
        self.mode = mode;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    pub fn freehand(&self) -> &FreehandTool {
        &self.freehand
    }

    /// Apply a mutation as one undo step. Failed mutations leave no step.
    pub fn execute(&mut self, mutation: CanvasMutation) -> Result<(), String> {
        if self.gesture_depth > 0 {
            return self.engine.apply_mutation(mutation);
        }
        let before = self.engine.canvas().snapshot();
        self.engine.apply_mutation(mutation)?;
        self.history.push(before);
        Ok(())
    }

    /// Start a drag gesture. Mutations until the matching
    /// [`end_gesture`](Self::end_gesture) are applied live and undone together.
    pub fn begin_gesture(&mut self) {
        if self.gesture_depth == 0 {
            self.gesture_snapshot = Some(self.engine.canvas().snapshot());
        }
        self.gesture_depth += 1;
    }

    pub fn end_gesture(&mut self) {
        if self.gesture_depth == 0 {
            return;
        }
        self.gesture_depth -= 1;
        if self.gesture_depth > 0 {
            return;
        }
        if let Some(before) = self.gesture_snapshot.take() {
            if &before != self.engine.canvas() {
                self.history.push(before);
            }
        }
    }

    pub fn undo(&mut self) -> bool {
        if !self.history.can_undo() {
            return false;
        }
        let current = self.engine.canvas().snapshot();
        match self.history.undo(current) {
            Some(previous) => {
                self.restore(previous);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        if !self.history.can_redo() {
            return false;
        }
        let current = self.engine.canvas().snapshot();
        match self.history.redo(current) {
            Some(next) => {
                self.restore(next);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn restore(&mut self, snapshot: HistorySnapshot) {
        self.freehand.cancel();
        self.engine.restore(snapshot);
        let canvas = self.engine.canvas();
        self.selection.nodes.retain(|id| canvas.nodes.contains_key(id));
        self.selection.edges.retain(|id| canvas.edges.contains_key(id));
    }

    // ─── Staging ─────────────────────────────────────────────────────────

    pub fn place_staged(&mut self, node_id: ElementId, at: Point) -> Result<CanvasId, String> {
        let before = self.engine.canvas().snapshot();
        let id = self.engine.place_staged(node_id, at)?;
        self.history.push(before);
        Ok(id)
    }

    pub fn place_all_staged(&mut self) -> Vec<CanvasId> {
        let before = self.engine.canvas().snapshot();
        let placed = self.engine.place_all_staged();
        if !placed.is_empty() {
            self.history.push(before);
        }
        placed
    }

    // ─── Collaborators ───────────────────────────────────────────────────

    /// Open the inline label editor over a canvas node.
    pub fn begin_label_edit(
        &self,
        node: CanvasId,
        controller: &mut dyn EditorController,
    ) -> Result<(), String> {
        let node_id = self.node_element(node)?;
        controller.start_editing(node_id);
        Ok(())
    }

    /// Write a new label into the diagram text and onto the canvas.
    /// Returns the patched text.
    pub fn commit_label(
        &mut self,
        node: CanvasId,
        label: &str,
        text: &str,
        patcher: &dyn TextPatcher,
    ) -> Result<String, String> {
        let node_id = self.node_element(node)?;
        let patched = patcher.patch_label(text, node_id, label)?;
        self.execute(CanvasMutation::SetLabel {
            id: node,
            label: label.to_string(),
        })?;
        Ok(patched)
    }

    /// Turn a manual edge attached at both ends into a text edge. The manual
    /// edge is removed; the next reconciliation brings back its structural
    /// twin. Returns the patched text.
    pub fn promote_manual_edge(
        &mut self,
        edge: CanvasId,
        text: &str,
        patcher: &dyn TextPatcher,
    ) -> Result<String, String> {
        let canvas_edge = self
            .engine
            .canvas()
            .edges
            .get(&edge)
            .ok_or_else(|| format!("no edge {edge} on canvas"))?;
        if !canvas_edge.is_manual() {
            return Err(format!("edge {} is already in the text", canvas_edge.edge_id));
        }
        if canvas_edge.source.is_none() || canvas_edge.target.is_none() {
            return Err(format!("edge {} has a loose end", canvas_edge.edge_id));
        }
        let patched = patcher.add_edge(text, canvas_edge.source, canvas_edge.target)?;
        self.execute(CanvasMutation::DeleteSelection {
            nodes: Vec::new(),
            edges: vec![edge],
        })?;
        self.selection.edges.retain(|&id| id != edge);
        Ok(patched)
    }

    fn node_element(&self, node: CanvasId) -> Result<ElementId, String> {
        self.engine
            .canvas()
            .nodes
            .get(&node)
            .map(|n| n.node_id)
            .ok_or_else(|| format!("no node {node} on canvas"))
    }

    // ─── Input ───────────────────────────────────────────────────────────

    /// Returns true if the action changed anything.
    pub fn handle_shortcut(&mut self, action: ShortcutAction) -> bool {
        match action {
            ShortcutAction::Undo => self.undo(),
            ShortcutAction::Redo => self.redo(),
            ShortcutAction::Delete => {
                if self.selection.is_empty() {
                    return false;
                }
                let mutation = CanvasMutation::DeleteSelection {
                    nodes: self.selection.nodes.clone(),
                    edges: self.selection.edges.clone(),
                };
                match self.execute(mutation) {
                    Ok(()) => {
                        self.selection.clear();
                        true
                    }
                    Err(err) => {
                        log::debug!("delete: {err}");
                        false
                    }
                }
            }
            ShortcutAction::Deselect => {
                let changed = !self.selection.is_empty() || self.mode != CanvasMode::Select;
                self.selection.clear();
                self.set_mode(CanvasMode::Select);
                changed
            }
            ShortcutAction::ToggleDrawMode => {
                let next = match self.mode {
                    CanvasMode::Select => CanvasMode::Draw,
                    CanvasMode::Draw => CanvasMode::Select,
                };
                self.set_mode(next);
                true
            }
        }
    }

    pub fn handle_key(&mut self, key: &str, ctrl: bool, shift: bool, alt: bool, meta: bool) -> bool {
        match ShortcutMap::resolve(key, ctrl, shift, alt, meta) {
            Some(action) => self.handle_shortcut(action),
            None => false,
        }
    }

    /// Route an input event. In draw mode a completed stroke is added as a
    /// manual edge, selected, and the editor drops back to select mode.
    /// Returns the new edge's canvas id.
    pub fn handle_input(&mut self, event: &InputEvent) -> Result<Option<CanvasId>, String> {
        if let InputEvent::Key {
            key,
            ctrl,
            shift,
            alt,
            meta,
        } = event
        {
            self.handle_key(key, *ctrl, *shift, *alt, *meta);
            return Ok(None);
        }
        if self.mode != CanvasMode::Draw {
            return Ok(None);
        }

        let Some(mutation) = self.freehand.handle(event, self.engine.canvas(), self.zoom) else {
            return Ok(None);
        };
        let new_edge = match &mutation {
            CanvasMutation::AddManualEdge(edge) => Some(edge.canvas_id),
            _ => None,
        };
        self.execute(mutation)?;
        if let Some(id) = new_edge {
            self.selection = Selection {
                nodes: Vec::new(),
                edges: vec![id],
            };
        }
        self.mode = CanvasMode::Select;
        Ok(new_edge)
    }
}
