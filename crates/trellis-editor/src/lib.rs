//! Trellis editor: reconciliation state machine, direct manipulation,
//! freehand drawing and undo/redo on top of `trellis-core`.

pub mod commands;
pub mod config;
pub mod controller;
pub mod input;
pub mod shortcuts;
pub mod sync;
pub mod tools;

pub use commands::{CanvasMode, Editor, History, HistorySnapshot, Selection};
pub use config::EditorConfig;
pub use controller::{EditorController, TextPatcher};
pub use input::InputEvent;
pub use shortcuts::{ShortcutAction, ShortcutMap};
pub use sync::{
    CanvasMutation, EdgeEnd, LayoutRequest, ReconcileDelta, SyncEngine, SyncOutcome, SyncPhase,
};
pub use tools::FreehandTool;
