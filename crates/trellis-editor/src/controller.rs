//! Collaborators the editor drives but does not implement: the inline label
//! editor and the diagram-text patcher. Both are passed in explicitly.

use trellis_core::ElementId;

/// Opens an inline text editor over a node.
pub trait EditorController {
    fn start_editing(&mut self, node: ElementId);
}

/// Rewrites diagram source text. Implementations own the text grammar;
/// the editor treats every call as an opaque text transform.
pub trait TextPatcher {
    fn patch_label(&self, text: &str, node: ElementId, label: &str) -> Result<String, String>;
    fn add_edge(&self, text: &str, source: ElementId, target: ElementId) -> Result<String, String>;
    fn remove_edge(&self, text: &str, source: ElementId, target: ElementId)
    -> Result<String, String>;
}
