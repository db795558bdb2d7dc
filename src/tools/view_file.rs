//! `view_file` native tool (spec.md §4.6): reads a file with line numbers,
//! optionally scoped to a line range, middle-truncating large renders
//! around a single marker line.
//!
//! Grounded on the teacher's `read_tool` (`src/tools/claude_code.rs`) for
//! the line-numbering idiom, extended with the spec's documented
//! line-range slicing and middle-truncation behavior above a configurable
//! byte budget.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::{RuntimeError, ToolError};
use crate::value::{NativeTool, Value};

pub fn tool(truncation_budget_bytes: usize) -> Arc<NativeTool> {
    Arc::new(NativeTool {
        name: "view_file".to_string(),
        description: "Read a file's contents with line numbers, optionally scoped to a line range."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string"},
                "start_line": {"type": "integer", "description": "1-indexed, inclusive"},
                "end_line": {"type": "integer", "description": "1-indexed, inclusive"},
            },
            "required": ["file_path"],
        }),
        invoke: Arc::new(move |args: JsonValue| Box::pin(run(args, truncation_budget_bytes))),
    })
}

async fn run(args: JsonValue, truncation_budget_bytes: usize) -> Result<Value, RuntimeError> {
    let file_path = args
        .get("file_path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: "view_file".to_string(),
            message: "missing 'file_path'".to_string(),
        })?
        .to_string();
    let start_line = args.get("start_line").and_then(|v| v.as_u64()).map(|n| n as usize);
    let end_line = args.get("end_line").and_then(|v| v.as_u64()).map(|n| n as usize);

    let content = tokio::fs::read_to_string(&file_path)
        .await
        .map_err(|err| ToolError::Io(format!("{file_path}: {err}")))?;

    let normalized = normalize_line_endings(&content);
    let lines: Vec<&str> = normalized.lines().collect();
    let (slice, start_index) = select_range(&lines, start_line, end_line)?;

    Ok(Value::String(render_numbered(slice, start_index, truncation_budget_bytes)))
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Slices `lines` to the 1-indexed inclusive `[start_line, end_line]` range
/// (spec.md §4.6), defaulting to the whole file when a bound is omitted.
fn select_range<'a>(
    lines: &'a [&'a str],
    start_line: Option<usize>,
    end_line: Option<usize>,
) -> Result<(&'a [&'a str], usize), RuntimeError> {
    let total_lines = lines.len();
    let start = start_line.unwrap_or(1);

    if start_line.is_some() && start > total_lines {
        return Err(ToolError::InvalidArguments {
            tool: "view_file".to_string(),
            message: format!("start_line {start} exceeds total lines {total_lines}"),
        }
        .into());
    }
    if let Some(end) = end_line {
        if start > end {
            return Err(ToolError::InvalidArguments {
                tool: "view_file".to_string(),
                message: format!("start_line {start} is greater than end_line {end}"),
            }
            .into());
        }
    }

    let end = end_line.unwrap_or(total_lines).min(total_lines);
    if start > end {
        return Ok((&lines[0..0], 0));
    }
    Ok((&lines[start - 1..end], start - 1))
}

/// Line-numbers every line as `%5d:%s`; when the rendered slice exceeds
/// `budget` bytes, keeps roughly the first and last half of the budget and
/// drops the middle behind a single `(truncated)` marker line rather than
/// truncating per-line (spec.md §4.6).
fn render_numbered(lines: &[&str], start_index: usize, budget: usize) -> String {
    let full = number_lines(lines, start_index);
    if full.len() <= budget {
        return full;
    }

    let half_budget = budget / 2;
    let head_lines = lines_within_budget(lines, half_budget, true);
    let tail_lines = lines_within_budget(lines, half_budget, false);
    let tail_start = lines.len().saturating_sub(tail_lines);

    let mut rendered = number_lines(&lines[..head_lines], start_index);
    rendered.push_str("\n(truncated)\n");
    rendered.push_str(&number_lines(&lines[tail_start..], start_index + tail_start));
    rendered
}

fn number_lines(lines: &[&str], start_index: usize) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:5}:{}", start_index + i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn lines_within_budget(lines: &[&str], budget: usize, from_start: bool) -> usize {
    let mut used = 0;
    let mut count = 0;
    let iter: Box<dyn Iterator<Item = &&str>> =
        if from_start { Box::new(lines.iter()) } else { Box::new(lines.iter().rev()) };
    for line in iter {
        used += line.len() + 1;
        if used > budget {
            break;
        }
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_file_is_rendered_without_truncation() {
        let content = "a\nb\nc";
        let lines: Vec<&str> = content.lines().collect();
        let rendered = render_numbered(&lines, 0, 1024);
        assert_eq!(rendered, "    1:a\n    2:b\n    3:c");
    }

    #[test]
    fn large_file_is_middle_truncated_once() {
        let content = (1..=1000).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let lines: Vec<&str> = content.lines().collect();
        let rendered = render_numbered(&lines, 0, 200);
        assert_eq!(rendered.matches("(truncated)").count(), 1);
        assert!(rendered.starts_with("    1:line 1"));
        assert!(rendered.ends_with("line 1000"));
    }

    #[test]
    fn select_range_slices_to_the_requested_bounds() {
        let content = "a\nb\nc\nd\ne";
        let lines: Vec<&str> = content.lines().collect();
        let (slice, start_index) = select_range(&lines, Some(2), Some(4)).unwrap();
        assert_eq!(slice, &["b", "c", "d"]);
        assert_eq!(start_index, 1);
    }

    #[test]
    fn select_range_fails_when_start_line_exceeds_total_lines() {
        let lines: Vec<&str> = "a\nb".lines().collect();
        let err = select_range(&lines, Some(5), None).unwrap_err();
        assert!(err.to_string().contains("exceeds total lines"));
    }

    #[test]
    fn select_range_fails_when_start_line_is_greater_than_end_line() {
        let lines: Vec<&str> = "a\nb\nc".lines().collect();
        let err = select_range(&lines, Some(3), Some(1)).unwrap_err();
        assert!(err.to_string().contains("is greater than end_line"));
    }
}
