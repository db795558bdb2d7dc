//! Native tools surfaced to scripts under `gsh.tools` (spec.md §4.6).
//!
//! Each tool here is grounded on the corresponding handler in the teacher's
//! `src/tools/claude_code.rs` (bash/read/edit/grep), generalized to the
//! spec's documented contracts (pty-attached exec, backend-detecting grep,
//! middle-truncating view, exact-once edit) and built as a `NativeTool`
//! value rather than a `ToolSpec` registered on a `DependencyMap`.

mod edit_file;
mod exec;
mod grep;
mod view_file;

use std::sync::Arc;

use crate::runtime::RuntimeConfig;
use crate::value::NativeTool;

/// Builds the full native tool set a `Runtime` registers under
/// `gsh.tools.*` (spec.md §4.6).
pub fn default_tools(config: &RuntimeConfig) -> Vec<Arc<NativeTool>> {
    vec![
        exec::tool(config.exec_default_timeout_secs, config.tool_output_cap_bytes),
        grep::tool(config.tool_output_cap_bytes),
        view_file::tool(config.view_file_truncation_budget_bytes),
        edit_file::tool(),
    ]
}
