//! Reconciliation engine: graph + overlay + layout → canvas.
//!
//! The engine owns the live [`CanvasState`] and drives it through two
//! directions of change:
//!
//! - **Text → Canvas**: a freshly parsed [`Graph`] is laid out by an external
//!   engine, merged with the persisted overlay, and applied to the canvas as
//!   a [`ReconcileDelta`]. At most one layout is in flight; graphs arriving
//!   meanwhile are queued and only the newest queued graph survives.
//!
//! - **Canvas → Overlay**: direct manipulation arrives as a
//!   [`CanvasMutation`]. Each one mutates the canvas, writes the result back
//!   into the overlay and re-tracks the endpoints of affected edges.

use crate::config::EditorConfig;
use std::collections::{HashMap, HashSet};
use trellis_core::canvas::CanvasState;
use trellis_core::layout::LayoutEngine;
use trellis_core::merge::{MergeResult, merge, stale_overlay_ids};
use trellis_core::model::*;
use trellis_core::overlay::{EdgeOverlay, EdgeOverlayPatch, NodeOverlayPatch, Overlay};
use trellis_core::smoothing::smooth;
use trellis_core::staging::{StagedNode, now_millis, placement_positions, restage};
use trellis_core::tracking::{Attachment, compute_endpoints, nearest_node, retrack_all, retrack_edge, retrack_edges};
use trellis_core::{CanvasId, ElementId, Point};

// ─── Phases ──────────────────────────────────────────────────────────────

/// Where the engine is in the text → canvas cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Parsing,
    LayingOut,
    Reconciling,
}

/// A layout the host must compute and hand back via
/// [`SyncEngine::layout_ready`] with the same ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutRequest {
    pub ticket: u64,
    pub graph: Graph,
}

/// Canvas ids touched by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileDelta {
    pub upserted_nodes: Vec<CanvasId>,
    pub removed_nodes: Vec<CanvasId>,
    pub upserted_edges: Vec<CanvasId>,
    pub removed_edges: Vec<CanvasId>,
    /// Node ids now waiting in the staging tray.
    pub staged: Vec<ElementId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub delta: ReconcileDelta,
    /// The queued graph's layout request, if one was waiting.
    pub next: Option<LayoutRequest>,
}

// ─── Mutations ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEnd {
    Start,
    End,
}

/// A direct-manipulation change to the canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasMutation {
    MoveNode {
        id: CanvasId,
        x: f64,
        y: f64,
    },
    /// Width and height are clamped to the configured minimum.
    ResizeNode {
        id: CanvasId,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
    },
    SetNodeColor {
        id: CanvasId,
        color: ShapeColor,
    },
    SetLabel {
        id: CanvasId,
        label: String,
    },
    MoveWaypoint {
        id: CanvasId,
        index: usize,
        to: Point,
    },
    InsertWaypoint {
        id: CanvasId,
        index: usize,
        at: Point,
    },
    RemoveWaypoint {
        id: CanvasId,
        index: usize,
    },
    /// Manual edges only. Snaps to the nearest node or leaves the end free.
    MoveEndpoint {
        id: CanvasId,
        end: EdgeEnd,
        to: Point,
    },
    SetCurveType {
        id: CanvasId,
        curve_type: CurveType,
    },
    SetArrows {
        id: CanvasId,
        arrows: EdgeArrows,
    },
    /// Re-smooths the edge's raw stroke at a new level.
    SetSmoothing {
        id: CanvasId,
        level: f64,
    },
    SetEdgeColor {
        id: CanvasId,
        color: Color,
    },
    AddManualEdge(Box<CanvasEdge>),
    /// Removes nodes and manual edges. Structural edges are skipped.
    DeleteSelection {
        nodes: Vec<CanvasId>,
        edges: Vec<CanvasId>,
    },
}

/// Interior waypoints of a smoothed stroke. The stroke's own ends are
/// replaced by perimeter anchors, so they are not kept.
pub fn stroke_waypoints(raw: &[Point], level: f64) -> Waypoints {
    let smoothed = smooth(raw, level);
    if smoothed.len() <= 2 {
        return Waypoints::new();
    }
    smoothed[1..smoothed.len() - 1].iter().copied().collect()
}

// ─── Engine ──────────────────────────────────────────────────────────────

pub struct SyncEngine {
    canvas: CanvasState,

    /// Last graph that made it through reconciliation.
    graph: Option<Graph>,

    staged: Vec<StagedNode>,

    /// Staged nodes placed since the last pass; keeps their timestamps
    /// around in case an undo puts them back in the tray.
    placed: Vec<StagedNode>,

    node_ids: HashMap<ElementId, CanvasId>,
    edge_ids: HashMap<ElementId, CanvasId>,

    phase: SyncPhase,
    in_flight: Option<(u64, Graph)>,
    queued: Option<Graph>,
    next_ticket: u64,

    config: EditorConfig,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl SyncEngine {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            canvas: CanvasState::new(),
            graph: None,
            staged: Vec::new(),
            placed: Vec::new(),
            node_ids: HashMap::new(),
            edge_ids: HashMap::new(),
            phase: SyncPhase::Idle,
            in_flight: None,
            queued: None,
            next_ticket: 0,
            config,
        }
    }

    /// Start from a persisted overlay. Takes effect on the next pass.
    pub fn with_overlay(overlay: Overlay, config: EditorConfig) -> Self {
        let mut engine = Self::new(config);
        engine.canvas.overlay = overlay;
        engine
    }

    pub fn canvas(&self) -> &CanvasState {
        &self.canvas
    }

    pub fn overlay(&self) -> &Overlay {
        &self.canvas.overlay
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    pub fn staged(&self) -> &[StagedNode] {
        &self.staged
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn node_canvas_id(&self, node_id: ElementId) -> Option<CanvasId> {
        self.node_ids.get(&node_id).copied()
    }

    pub fn edge_canvas_id(&self, edge_id: ElementId) -> Option<CanvasId> {
        self.edge_ids.get(&edge_id).copied()
    }

    // ─── Text → Canvas direction ─────────────────────────────────────────

    pub fn parse_started(&mut self) {
        if self.phase == SyncPhase::Idle {
            self.phase = SyncPhase::Parsing;
        }
    }

    /// The canvas keeps showing the last good graph.
    pub fn parse_failed(&mut self, err: &str) {
        log::warn!("parse failed, keeping last graph: {err}");
        if self.phase == SyncPhase::Parsing {
            self.phase = SyncPhase::Idle;
        }
    }

    /// Accept a new graph. Returns a layout request unless one is already in
    /// flight, in which case the graph is queued (replacing any older one).
    pub fn graph_parsed(&mut self, graph: Graph) -> Option<LayoutRequest> {
        if self.in_flight.is_some() {
            if self.queued.replace(graph).is_some() {
                log::debug!("queued graph superseded by a newer one");
            }
            return None;
        }
        Some(self.issue(graph))
    }

    /// Apply the layout for `ticket`. A ticket that is not in flight is
    /// reported and its layout discarded.
    pub fn layout_ready(&mut self, ticket: u64, layout: LayoutResult) -> Result<SyncOutcome, String> {
        let graph = match self.in_flight.take() {
            Some((current, graph)) if current == ticket => graph,
            other => {
                self.in_flight = other;
                log::warn!("discarding layout for stale ticket {ticket}");
                return Err(format!("layout ticket {ticket} is not in flight"));
            }
        };

        self.phase = SyncPhase::Reconciling;
        let delta = self.reconcile(graph, &layout);
        let next = self.next_request();
        Ok(SyncOutcome { delta, next })
    }

    /// The canvas is left as it was. Returns the queued request, if any.
    pub fn layout_failed(&mut self, ticket: u64) -> Option<LayoutRequest> {
        if !self.in_flight.as_ref().is_some_and(|(t, _)| *t == ticket) {
            log::warn!("ignoring failure for stale layout ticket {ticket}");
            return None;
        }
        log::warn!("layout failed for ticket {ticket}; canvas unchanged");
        self.in_flight = None;
        self.next_request()
    }

    /// Run one full cycle against a synchronous layout engine.
    pub fn sync_with(&mut self, graph: Graph, engine: &dyn LayoutEngine) -> Result<ReconcileDelta, String> {
        let request = self
            .graph_parsed(graph)
            .ok_or_else(|| "a layout pass is already in flight".to_string())?;
        let layout = match engine.layout(&request.graph) {
            Ok(layout) => layout,
            Err(err) => {
                self.layout_failed(request.ticket);
                return Err(err);
            }
        };
        self.layout_ready(request.ticket, layout).map(|outcome| outcome.delta)
    }

    fn issue(&mut self, graph: Graph) -> LayoutRequest {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.in_flight = Some((ticket, graph.clone()));
        self.phase = SyncPhase::LayingOut;
        LayoutRequest { ticket, graph }
    }

    fn next_request(&mut self) -> Option<LayoutRequest> {
        match self.queued.take() {
            Some(graph) => Some(self.issue(graph)),
            None => {
                self.phase = SyncPhase::Idle;
                None
            }
        }
    }

    fn reconcile(&mut self, graph: Graph, layout: &LayoutResult) -> ReconcileDelta {
        let merged = merge(&graph, &self.canvas.overlay, layout);
        let mut delta = ReconcileDelta::default();

        // Nodes
        let live: HashSet<ElementId> = merged.positioned_nodes.iter().map(|n| n.node_id).collect();
        for placed in &merged.positioned_nodes {
            let color = self
                .canvas
                .overlay
                .nodes
                .get(&placed.node_id)
                .and_then(|entry| entry.color)
                .unwrap_or(self.config.node_color);
            let canvas_id = *self.node_ids.entry(placed.node_id).or_insert_with(CanvasId::fresh);
            self.canvas.nodes.insert(
                canvas_id,
                CanvasNode {
                    canvas_id,
                    node_id: placed.node_id,
                    shape: placed.shape,
                    x: placed.x,
                    y: placed.y,
                    w: placed.w,
                    h: placed.h,
                    label: placed.label.clone(),
                    color,
                },
            );
            self.canvas
                .overlay
                .update_node(placed.node_id, NodeOverlayPatch::rect(placed.x, placed.y, placed.w, placed.h));
            delta.upserted_nodes.push(canvas_id);
        }

        let mut gone: Vec<ElementId> = self
            .node_ids
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        gone.sort();
        for node_id in &gone {
            if let Some(canvas_id) = self.node_ids.remove(node_id) {
                self.canvas.nodes.remove(&canvas_id);
                delta.removed_nodes.push(canvas_id);
            }
        }

        // Edges
        self.upsert_edges(&merged, &mut delta);
        self.canvas
            .overlay
            .cleanup(&merged.removed_node_ids, &merged.removed_edge_ids);
        for node_id in gone.iter().chain(&merged.removed_node_ids) {
            self.detach_node(*node_id);
        }
        self.materialize_manual_edges(&mut delta);
        retrack_all(&mut self.canvas);

        // Staging
        let mut previous = std::mem::take(&mut self.placed);
        previous.extend(self.staged.iter().cloned());
        self.staged = restage(&previous, merged.staged_nodes.clone(), now_millis());
        delta.staged = self.staged.iter().map(|s| s.node.id).collect();

        log::debug!(
            "reconcile: {} nodes upserted, {} removed, {} edges upserted, {} removed, {} staged",
            delta.upserted_nodes.len(),
            delta.removed_nodes.len(),
            delta.upserted_edges.len(),
            delta.removed_edges.len(),
            delta.staged.len()
        );

        self.graph = Some(graph);
        delta
    }

    /// Bring structural canvas edges in line with a merge. Edges with an end
    /// that is not on the canvas are dropped until that node is placed.
    fn upsert_edges(&mut self, merged: &MergeResult, delta: &mut ReconcileDelta) {
        let mut kept = HashSet::new();
        for edge in &merged.edges {
            let source = self.attachment(edge.source);
            let target = self.attachment(edge.target);
            let (Some(source), Some(target)) = (source, target) else {
                continue;
            };

            let canvas_id = *self.edge_ids.entry(edge.edge_id).or_insert_with(CanvasId::fresh);
            let mut canvas_edge = CanvasEdge {
                canvas_id,
                edge_id: edge.edge_id,
                source: edge.source,
                target: edge.target,
                start: source.bounds.center(),
                end: target.bounds.center(),
                waypoints: edge.waypoints.clone(),
                curve_type: edge.curve_type,
                label: edge.label.clone(),
                color: edge.color.unwrap_or(self.config.edge_color),
                origin: EdgeOrigin::Structural,
                arrows: edge.arrows.unwrap_or_default(),
                raw_points: None,
                smoothing: None,
            };
            let (start, end) = compute_endpoints(&canvas_edge, Some(source), Some(target));
            canvas_edge.start = start;
            canvas_edge.end = end;

            self.canvas.edges.insert(canvas_id, canvas_edge);
            self.canvas.overlay.update_edge(
                edge.edge_id,
                EdgeOverlayPatch::routing(edge.waypoints.clone(), edge.curve_type),
            );
            kept.insert(edge.edge_id);
            delta.upserted_edges.push(canvas_id);
        }

        let mut dropped: Vec<(ElementId, CanvasId)> = self
            .edge_ids
            .iter()
            .filter(|(id, canvas_id)| {
                !kept.contains(*id) && self.canvas.edges.get(*canvas_id).is_none_or(|e| !e.is_manual())
            })
            .map(|(&id, &canvas_id)| (id, canvas_id))
            .collect();
        dropped.sort();
        for (edge_id, canvas_id) in dropped {
            self.edge_ids.remove(&edge_id);
            if self.canvas.edges.remove(&canvas_id).is_some() {
                delta.removed_edges.push(canvas_id);
            }
        }
    }

    /// Manual edges loaded from a persisted overlay get a canvas edge.
    fn materialize_manual_edges(&mut self, delta: &mut ReconcileDelta) {
        let mut missing: Vec<ElementId> = self
            .canvas
            .overlay
            .manual_edge_ids()
            .filter(|id| !self.edge_ids.contains_key(id))
            .collect();
        missing.sort();

        for edge_id in missing {
            let Some(entry) = self.canvas.overlay.edges.get(&edge_id) else {
                continue;
            };
            let canvas_id = CanvasId::fresh();
            let edge = manual_edge_from_overlay(canvas_id, edge_id, entry, self.config.edge_color);
            self.edge_ids.insert(edge_id, canvas_id);
            self.canvas.edges.insert(canvas_id, edge);
            delta.upserted_edges.push(canvas_id);
        }
    }

    fn attachment(&self, node_id: ElementId) -> Option<Attachment> {
        let canvas_id = self.node_ids.get(&node_id)?;
        self.canvas.nodes.get(canvas_id).map(Attachment::from)
    }

    fn detach_node(&mut self, node_id: ElementId) {
        self.canvas.overlay.detach_manual_edges(node_id);
        for edge in self.canvas.edges.values_mut().filter(|e| e.is_manual()) {
            if edge.source == node_id {
                edge.source = ElementId::none();
            }
            if edge.target == node_id {
                edge.target = ElementId::none();
            }
        }
    }

    // ─── Staging ─────────────────────────────────────────────────────────

    /// Drop a staged node onto the canvas at `at` with the default size.
    pub fn place_staged(&mut self, node_id: ElementId, at: Point) -> Result<CanvasId, String> {
        let index = self
            .staged
            .iter()
            .position(|s| s.node.id == node_id)
            .ok_or_else(|| format!("node {node_id} is not staged"))?;
        let staged = self.staged.remove(index);

        let (w, h) = self.config.default_node_size;
        let canvas_id = CanvasId::fresh();
        self.canvas.nodes.insert(
            canvas_id,
            CanvasNode {
                canvas_id,
                node_id,
                shape: staged.node.shape,
                x: at.x,
                y: at.y,
                w,
                h,
                label: staged.node.label.clone(),
                color: self.config.node_color,
            },
        );
        self.node_ids.insert(node_id, canvas_id);
        self.canvas
            .overlay
            .update_node(node_id, NodeOverlayPatch::rect(at.x, at.y, w, h));
        self.placed.push(staged);

        self.refresh_edges();
        retrack_edges(&mut self.canvas, &[node_id]);
        Ok(canvas_id)
    }

    /// Place every staged node on a grid below the lowest canvas node.
    pub fn place_all_staged(&mut self) -> Vec<CanvasId> {
        let origin = self.config.staging_origin(self.canvas.lowest_node_bottom());
        let ids: Vec<ElementId> = self.staged.iter().map(|s| s.node.id).collect();
        let positions = placement_positions(
            ids.len(),
            origin,
            self.config.staging_columns,
            self.config.staging_pitch(),
        );
        ids.into_iter()
            .zip(positions)
            .filter_map(|(node_id, at)| self.place_staged(node_id, at).ok())
            .collect()
    }

    /// Re-run the edge half of a merge so edges to a newly placed node appear.
    fn refresh_edges(&mut self) {
        let merged = match &self.graph {
            Some(graph) => merge(graph, &self.canvas.overlay, &LayoutResult::default()),
            None => return,
        };
        let mut scratch = ReconcileDelta::default();
        self.upsert_edges(&merged, &mut scratch);
    }

    /// Swap in a history snapshot. Nodes, structural edges and overlay
    /// entries the current graph no longer names are dropped, as the next
    /// reconciliation would. Graph nodes that end up with neither a canvas
    /// node nor an overlay entry go back to the tray.
    pub fn restore(&mut self, snapshot: CanvasState) {
        self.canvas = snapshot;

        let live = self
            .graph
            .as_ref()
            .map(|g| (g.node_ids(), g.edge_ids(), stale_overlay_ids(g, &self.canvas.overlay)));
        if let Some((node_ids, edge_ids, (removed_nodes, removed_edges))) = live {
            self.canvas.overlay.cleanup(&removed_nodes, &removed_edges);

            let mut gone: Vec<ElementId> = Vec::new();
            self.canvas.nodes.retain(|_, n| {
                let keep = node_ids.contains(&n.node_id);
                if !keep {
                    gone.push(n.node_id);
                }
                keep
            });
            let on_canvas: HashSet<ElementId> = self.canvas.nodes.values().map(|n| n.node_id).collect();
            self.canvas.edges.retain(|_, e| {
                e.is_manual()
                    || (edge_ids.contains(&e.edge_id)
                        && on_canvas.contains(&e.source)
                        && on_canvas.contains(&e.target))
            });

            if !gone.is_empty() || !removed_nodes.is_empty() {
                log::debug!(
                    "restore: dropped {} canvas nodes and {} overlay nodes absent from the graph",
                    gone.len(),
                    removed_nodes.len()
                );
            }
            for node_id in gone.iter().chain(&removed_nodes) {
                self.detach_node(*node_id);
            }
        }

        self.node_ids = self
            .canvas
            .nodes
            .values()
            .map(|n| (n.node_id, n.canvas_id))
            .collect();
        self.edge_ids = self
            .canvas
            .edges
            .values()
            .map(|e| (e.edge_id, e.canvas_id))
            .collect();

        let Some(graph) = &self.graph else {
            return;
        };
        let pending: Vec<GraphNode> = graph
            .nodes
            .iter()
            .filter(|n| !self.node_ids.contains_key(&n.id) && !self.canvas.overlay.nodes.contains_key(&n.id))
            .cloned()
            .collect();
        let mut previous = self.staged.clone();
        previous.extend(self.placed.iter().cloned());
        self.staged = restage(&previous, pending, now_millis());
    }

    // ─── Canvas → Overlay direction ──────────────────────────────────────

    pub fn apply_mutation(&mut self, mutation: CanvasMutation) -> Result<(), String> {
        match mutation {
            CanvasMutation::MoveNode { id, x, y } => {
                let node = self.node_mut(id)?;
                node.x = x;
                node.y = y;
                let node_id = node.node_id;
                self.canvas
                    .overlay
                    .update_node(node_id, NodeOverlayPatch::position(x, y));
                retrack_edges(&mut self.canvas, &[node_id]);
            }
            CanvasMutation::ResizeNode { id, x, y, w, h } => {
                let (min_w, min_h) = self.config.min_node_size;
                let (w, h) = (w.max(min_w), h.max(min_h));
                let node = self.node_mut(id)?;
                node.x = x;
                node.y = y;
                node.w = w;
                node.h = h;
                let node_id = node.node_id;
                self.canvas
                    .overlay
                    .update_node(node_id, NodeOverlayPatch::rect(x, y, w, h));
                retrack_edges(&mut self.canvas, &[node_id]);
            }
            CanvasMutation::SetNodeColor { id, color } => {
                let node = self.node_mut(id)?;
                node.color = color;
                let node_id = node.node_id;
                self.canvas.overlay.update_node(
                    node_id,
                    NodeOverlayPatch {
                        color: Some(color),
                        ..NodeOverlayPatch::default()
                    },
                );
            }
            CanvasMutation::SetLabel { id, label } => {
                self.node_mut(id)?.label = label;
            }
            CanvasMutation::MoveWaypoint { id, index, to } => {
                let edge = self.edge_mut(id)?;
                let point = edge
                    .waypoints
                    .get_mut(index)
                    .ok_or_else(|| format!("edge {id} has no waypoint {index}"))?;
                *point = to;
                self.edge_changed(id);
            }
            CanvasMutation::InsertWaypoint { id, index, at } => {
                let edge = self.edge_mut(id)?;
                if index > edge.waypoints.len() {
                    return Err(format!("edge {id}: waypoint index {index} out of range"));
                }
                edge.waypoints.insert(index, at);
                self.edge_changed(id);
            }
            CanvasMutation::RemoveWaypoint { id, index } => {
                let edge = self.edge_mut(id)?;
                if index >= edge.waypoints.len() {
                    return Err(format!("edge {id} has no waypoint {index}"));
                }
                edge.waypoints.remove(index);
                self.edge_changed(id);
            }
            CanvasMutation::MoveEndpoint { id, end, to } => {
                self.move_endpoint(id, end, to)?;
            }
            CanvasMutation::SetCurveType { id, curve_type } => {
                self.edge_mut(id)?.curve_type = curve_type;
                self.edge_changed(id);
            }
            CanvasMutation::SetArrows { id, arrows } => {
                self.edge_mut(id)?.arrows = arrows;
                self.edge_changed(id);
            }
            CanvasMutation::SetSmoothing { id, level } => {
                let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
                let edge = self.edge_mut(id)?;
                let raw = edge
                    .raw_points
                    .as_deref()
                    .filter(|raw| raw.len() >= 2)
                    .ok_or_else(|| format!("edge {id} has no freehand stroke to smooth"))?;
                edge.waypoints = stroke_waypoints(raw, level);
                edge.smoothing = Some(level);
                self.edge_changed(id);
            }
            CanvasMutation::SetEdgeColor { id, color } => {
                self.edge_mut(id)?.color = color;
                self.edge_changed(id);
            }
            CanvasMutation::AddManualEdge(edge) => {
                let mut edge = *edge;
                if self.edge_ids.contains_key(&edge.edge_id) {
                    return Err(format!("edge {} already exists", edge.edge_id));
                }
                edge.origin = EdgeOrigin::Manual;
                let canvas_id = edge.canvas_id;
                self.edge_ids.insert(edge.edge_id, canvas_id);
                self.canvas.edges.insert(canvas_id, edge);
                self.edge_changed(canvas_id);
            }
            CanvasMutation::DeleteSelection { nodes, edges } => {
                self.delete_selection(&nodes, &edges)?;
            }
        }
        Ok(())
    }

    fn move_endpoint(&mut self, id: CanvasId, end: EdgeEnd, to: Point) -> Result<(), String> {
        let snapped = nearest_node(&self.canvas, to, self.config.snap_threshold).map(|n| n.node_id);
        let edge = self.edge_mut(id)?;
        if !edge.is_manual() {
            log::warn!("refusing to re-wire structural edge {}", edge.edge_id);
            return Err(format!("edge {} follows the diagram text", edge.edge_id));
        }
        let node_id = snapped.unwrap_or_else(ElementId::none);
        match end {
            EdgeEnd::Start => {
                edge.source = node_id;
                edge.start = to;
            }
            EdgeEnd::End => {
                edge.target = node_id;
                edge.end = to;
            }
        }
        self.edge_changed(id);
        Ok(())
    }

    fn delete_selection(&mut self, nodes: &[CanvasId], edges: &[CanvasId]) -> Result<(), String> {
        let mut deleted = 0;

        for &id in edges {
            match self.canvas.edges.get(&id) {
                None => log::warn!("delete: no edge {id}"),
                Some(edge) if !edge.is_manual() => {
                    log::warn!("delete: skipping structural edge {}", edge.edge_id);
                }
                Some(edge) => {
                    let edge_id = edge.edge_id;
                    self.canvas.edges.remove(&id);
                    self.canvas.overlay.remove_manual_edge(edge_id);
                    self.edge_ids.remove(&edge_id);
                    deleted += 1;
                }
            }
        }

        for &id in nodes {
            let Some(node) = self.canvas.nodes.remove(&id) else {
                log::warn!("delete: no node {id}");
                continue;
            };
            self.node_ids.remove(&node.node_id);
            self.detach_node(node.node_id);
            // Only structural edges still touch the node after detaching.
            for canvas_id in self.canvas.edges_touching(&[node.node_id]) {
                if let Some(edge) = self.canvas.edges.remove(&canvas_id) {
                    self.edge_ids.remove(&edge.edge_id);
                }
            }
            deleted += 1;
        }

        if deleted == 0 {
            return Err("nothing deletable in selection".to_string());
        }
        Ok(())
    }

    /// Re-anchor an edited edge and write it back to the overlay.
    fn edge_changed(&mut self, id: CanvasId) {
        retrack_edge(&mut self.canvas, id);
        let Some(edge) = self.canvas.edges.get(&id) else {
            return;
        };
        if edge.is_manual() {
            let entry = manual_overlay_entry(edge);
            self.canvas.overlay.add_manual_edge(edge.edge_id, entry);
        } else {
            let patch = EdgeOverlayPatch {
                arrows: Some(edge.arrows),
                color: Some(edge.color),
                ..EdgeOverlayPatch::routing(edge.waypoints.clone(), edge.curve_type)
            };
            self.canvas.overlay.update_edge(edge.edge_id, patch);
        }
    }

    fn node_mut(&mut self, id: CanvasId) -> Result<&mut CanvasNode, String> {
        self.canvas
            .nodes
            .get_mut(&id)
            .ok_or_else(|| format!("no node {id} on canvas"))
    }

    fn edge_mut(&mut self, id: CanvasId) -> Result<&mut CanvasEdge, String> {
        self.canvas
            .edges
            .get_mut(&id)
            .ok_or_else(|| format!("no edge {id} on canvas"))
    }
}

fn attached(id: ElementId) -> Option<ElementId> {
    (!id.is_none()).then_some(id)
}

fn manual_overlay_entry(edge: &CanvasEdge) -> EdgeOverlay {
    EdgeOverlay {
        waypoints: edge.waypoints.clone(),
        curve_type: edge.curve_type,
        origin: EdgeOrigin::Manual,
        source: attached(edge.source),
        target: attached(edge.target),
        arrows: Some(edge.arrows),
        raw_points: edge.raw_points.clone(),
        smoothing: edge.smoothing,
        color: Some(edge.color),
    }
}

/// Free ends fall back to the raw stroke's ends, then to the outer
/// waypoints. Attached ends are re-anchored by the tracker afterwards.
fn manual_edge_from_overlay(
    canvas_id: CanvasId,
    edge_id: ElementId,
    entry: &EdgeOverlay,
    default_color: Color,
) -> CanvasEdge {
    let raw = entry.raw_points.as_deref().unwrap_or_default();
    let start = raw
        .first()
        .or(entry.waypoints.first())
        .copied()
        .unwrap_or(Point::ZERO);
    let end = raw
        .last()
        .or(entry.waypoints.last())
        .copied()
        .unwrap_or(start);
    CanvasEdge {
        canvas_id,
        edge_id,
        source: entry.source.unwrap_or_else(ElementId::none),
        target: entry.target.unwrap_or_else(ElementId::none),
        start,
        end,
        waypoints: entry.waypoints.clone(),
        curve_type: entry.curve_type,
        label: String::new(),
        color: entry.color.unwrap_or(default_color),
        origin: EdgeOrigin::Manual,
        arrows: entry.arrows.unwrap_or_default(),
        raw_points: entry.raw_points.clone(),
        smoothing: entry.smoothing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trellis_core::Rect;

    fn assert_near(a: Point, b: Point) {
        assert!((a - b).hypot() < 1e-9, "{a:?} != {b:?}");
    }

    fn two_nodes() -> Graph {
        Graph::new(Direction::TD)
            .with_node("A", "Alpha", ShapeKind::Box)
            .with_node("B", "Beta", ShapeKind::Box)
            .with_edge("A", "B", "")
    }

    fn layout_for_two() -> LayoutResult {
        let a = ElementId::intern("A");
        let b = ElementId::intern("B");
        LayoutResult {
            nodes: vec![
                LayoutNode {
                    id: a,
                    x: 0.0,
                    y: 0.0,
                    width: 160.0,
                    height: 70.0,
                },
                LayoutNode {
                    id: b,
                    x: 0.0,
                    y: 150.0,
                    width: 160.0,
                    height: 70.0,
                },
            ],
            edges: vec![LayoutEdge {
                id: ElementId::intern("A->B"),
                source: a,
                target: b,
                bend_points: vec![Point::new(80.0, 70.0), Point::new(80.0, 150.0)],
            }],
            width: 160.0,
            height: 220.0,
        }
    }

    fn synced() -> SyncEngine {
        let mut engine = SyncEngine::default();
        let request = engine.graph_parsed(two_nodes()).unwrap();
        engine.layout_ready(request.ticket, layout_for_two()).unwrap();
        engine
    }

    #[test]
    fn reconcile_places_nodes_and_anchors_edge() {
        let engine = synced();
        let a = engine.canvas().node_by_element(ElementId::intern("A")).unwrap();
        assert_eq!(a.bounds(), Rect::new(0.0, 0.0, 160.0, 70.0));
        assert_eq!(a.label, "Alpha");

        let edge = engine.canvas().edge_by_element(ElementId::intern("A->B")).unwrap();
        assert_near(edge.start, Point::new(80.0, 70.0));
        assert_near(edge.end, Point::new(80.0, 150.0));
        assert_eq!(edge.curve_type, CurveType::Bezier);
        assert_eq!(edge.color, Color::EDGE_DEFAULT);
        assert_eq!(engine.phase(), SyncPhase::Idle);
    }

    #[test]
    fn reconcile_records_placement_in_overlay() {
        let engine = synced();
        let entry = &engine.overlay().nodes[&ElementId::intern("B")];
        assert_eq!(entry.rect(), Rect::new(0.0, 150.0, 160.0, 220.0));
        assert!(engine.overlay().edges.contains_key(&ElementId::intern("A->B")));
    }

    #[test]
    fn canvas_ids_survive_a_second_pass() {
        let mut engine = synced();
        let before = engine.node_canvas_id(ElementId::intern("A")).unwrap();
        let request = engine.graph_parsed(two_nodes()).unwrap();
        let outcome = engine.layout_ready(request.ticket, layout_for_two()).unwrap();
        assert_eq!(engine.node_canvas_id(ElementId::intern("A")), Some(before));
        assert!(outcome.delta.removed_nodes.is_empty());
    }

    #[test]
    fn phases_follow_the_cycle() {
        let mut engine = SyncEngine::default();
        engine.parse_started();
        assert_eq!(engine.phase(), SyncPhase::Parsing);
        let request = engine.graph_parsed(two_nodes()).unwrap();
        assert_eq!(engine.phase(), SyncPhase::LayingOut);
        engine.layout_ready(request.ticket, layout_for_two()).unwrap();
        assert_eq!(engine.phase(), SyncPhase::Idle);
    }

    #[test]
    fn parse_failure_keeps_last_graph() {
        let mut engine = synced();
        engine.parse_started();
        engine.parse_failed("unexpected token");
        assert_eq!(engine.phase(), SyncPhase::Idle);
        assert_eq!(engine.graph(), Some(&two_nodes()));
        assert_eq!(engine.canvas().nodes.len(), 2);
    }

    #[test]
    fn move_node_retracks_edges_and_writes_overlay() {
        let mut engine = synced();
        let b = engine.node_canvas_id(ElementId::intern("B")).unwrap();
        engine
            .apply_mutation(CanvasMutation::MoveNode {
                id: b,
                x: 0.0,
                y: 300.0,
            })
            .unwrap();

        let entry = &engine.overlay().nodes[&ElementId::intern("B")];
        assert_eq!((entry.x, entry.y), (0.0, 300.0));
        let edge = engine.canvas().edge_by_element(ElementId::intern("A->B")).unwrap();
        assert_near(edge.end, Point::new(80.0, 300.0));
    }

    #[test]
    fn resize_clamps_to_minimum() {
        let mut engine = synced();
        let a = engine.node_canvas_id(ElementId::intern("A")).unwrap();
        engine
            .apply_mutation(CanvasMutation::ResizeNode {
                id: a,
                x: 0.0,
                y: 0.0,
                w: 10.0,
                h: 500.0,
            })
            .unwrap();
        let node = &engine.canvas().nodes[&a];
        assert_eq!((node.w, node.h), (60.0, 500.0));
    }

    #[test]
    fn unknown_ids_are_errors() {
        let mut engine = synced();
        let ghost = CanvasId::fresh();
        assert!(
            engine
                .apply_mutation(CanvasMutation::MoveNode {
                    id: ghost,
                    x: 0.0,
                    y: 0.0
                })
                .is_err()
        );
        assert!(
            engine
                .apply_mutation(CanvasMutation::SetCurveType {
                    id: ghost,
                    curve_type: CurveType::Straight
                })
                .is_err()
        );
    }

    #[test]
    fn waypoint_edits_are_bounds_checked() {
        let mut engine = synced();
        let edge = engine.edge_canvas_id(ElementId::intern("A->B")).unwrap();
        assert!(
            engine
                .apply_mutation(CanvasMutation::RemoveWaypoint { id: edge, index: 0 })
                .is_err()
        );
        engine
            .apply_mutation(CanvasMutation::InsertWaypoint {
                id: edge,
                index: 0,
                at: Point::new(300.0, 110.0),
            })
            .unwrap();
        engine
            .apply_mutation(CanvasMutation::MoveWaypoint {
                id: edge,
                index: 0,
                to: Point::new(320.0, 110.0),
            })
            .unwrap();
        let entry = &engine.overlay().edges[&ElementId::intern("A->B")];
        assert_eq!(entry.waypoints.as_slice(), &[Point::new(320.0, 110.0)]);
    }

    #[test]
    fn structural_endpoints_cannot_be_moved() {
        let mut engine = synced();
        let edge = engine.edge_canvas_id(ElementId::intern("A->B")).unwrap();
        let result = engine.apply_mutation(CanvasMutation::MoveEndpoint {
            id: edge,
            end: EdgeEnd::End,
            to: Point::new(500.0, 500.0),
        });
        assert!(result.is_err());
    }

    #[test]
    fn stroke_waypoints_drop_stroke_ends() {
        let raw = [
            Point::new(0.0, 0.0),
            Point::new(50.0, 80.0),
            Point::new(100.0, 0.0),
        ];
        assert_eq!(stroke_waypoints(&raw, 0.0).as_slice(), &[Point::new(50.0, 80.0)]);
        assert!(stroke_waypoints(&raw[..2], 0.5).is_empty());
    }
}
