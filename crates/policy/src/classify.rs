//! Tool classification for budget accounting.

use toolforge_core::ToolKind;

/// Map a tool name to its budget kind.
///
/// Unknown tools classify as `Other`; they still consume the overall
/// tool-call budget even when no kind-specific cap applies.
pub fn classify_tool(name: &str) -> ToolKind {
    match name {
        "read_file" | "list_dir" => ToolKind::Read,
        "write_file" => ToolKind::Write,
        _ => ToolKind::Other,
    }
}
