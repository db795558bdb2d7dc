//! `edit_file` native tool (spec.md §4.6): exact-once find/replace that
//! preserves the file's original line-ending style and mode bits, and can
//! scope the search to a line range.
//!
//! Grounded on the teacher's `edit_tool` (`src/tools/claude_code.rs`) for
//! the read-check-replace-write shape; the exact-once requirement (error
//! out on zero or multiple matches rather than replacing all of them), the
//! range-scoped search, and the line-ending/mode preservation are this
//! crate's additions, since the teacher's version replaces every
//! occurrence unconditionally.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::{RuntimeError, ToolError};
use crate::value::{NativeTool, Value};

pub fn tool() -> Arc<NativeTool> {
    Arc::new(NativeTool {
        name: "edit_file".to_string(),
        description: "Replace an exact, single occurrence of a string in a file.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "Absolute path"},
                "find": {"type": "string"},
                "replace": {"type": "string"},
                "start_line": {"type": "integer", "description": "1-indexed, inclusive"},
                "end_line": {"type": "integer", "description": "1-indexed, inclusive"},
            },
            "required": ["file_path", "find", "replace"],
        }),
        invoke: Arc::new(|args: JsonValue| Box::pin(run(args))),
    })
}

async fn run(args: JsonValue) -> Result<Value, RuntimeError> {
    let file_path = required_str(&args, "file_path")?;
    let find = required_str(&args, "find")?;
    let replace = required_str(&args, "replace")?;
    let start_line = args.get("start_line").and_then(|v| v.as_u64()).map(|n| n as usize);
    let end_line = args.get("end_line").and_then(|v| v.as_u64()).map(|n| n as usize);

    if !Path::new(&file_path).is_absolute() {
        return Err(ToolError::InvalidArguments {
            tool: "edit_file".to_string(),
            message: format!("file_path must be absolute, got '{file_path}'"),
        }
        .into());
    }

    let raw = tokio::fs::read_to_string(&file_path)
        .await
        .map_err(|err| ToolError::Io(format!("{file_path}: {err}")))?;

    let line_ending = detect_line_ending(&raw);
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let edited_unified = apply_edit(&unified, &find, &replace, start_line, end_line)?;
    let updated = if line_ending == "\n" {
        edited_unified
    } else {
        edited_unified.replace('\n', line_ending)
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = tokio::fs::metadata(&file_path)
            .await
            .map(|m| m.permissions().mode())
            .ok();
        tokio::fs::write(&file_path, &updated)
            .await
            .map_err(|err| ToolError::Io(format!("{file_path}: {err}")))?;
        if let Some(mode) = mode {
            let _ = tokio::fs::set_permissions(&file_path, std::fs::Permissions::from_mode(mode)).await;
        }
    }
    #[cfg(not(unix))]
    {
        tokio::fs::write(&file_path, &updated)
            .await
            .map_err(|err| ToolError::Io(format!("{file_path}: {err}")))?;
    }

    Ok(Value::String(format!("Replaced 1 occurrence in {file_path}")))
}

/// Detects the file's dominant line-ending style so it can be restored on
/// write (spec.md §4.6); `\r\n` is checked before bare `\r` since it also
/// contains one.
fn detect_line_ending(raw: &str) -> &'static str {
    if raw.contains("\r\n") {
        "\r\n"
    } else if raw.contains('\r') {
        "\r"
    } else {
        "\n"
    }
}

/// Replaces `find` with `replace` in `unified` (already normalized to `\n`
/// line endings). When a range is given, the exact-once match requirement
/// and the replacement are both scoped to that joined range (spec.md §4.6);
/// the rest of the file is left untouched.
fn apply_edit(
    unified: &str,
    find: &str,
    replace: &str,
    start_line: Option<usize>,
    end_line: Option<usize>,
) -> Result<String, RuntimeError> {
    if start_line.is_none() && end_line.is_none() {
        let count = unified.matches(find).count();
        if count != 1 {
            return Err(ToolError::NotExactlyOnce(format!(
                "find string appears {count} times in file (must appear exactly once)"
            ))
            .into());
        }
        return Ok(unified.replacen(find, replace, 1));
    }

    let lines: Vec<&str> = unified.split('\n').collect();
    let total_lines = lines.len();
    let start = start_line.unwrap_or(1);
    if start == 0 || start > total_lines {
        return Err(ToolError::InvalidArguments {
            tool: "edit_file".to_string(),
            message: format!("start_line {start} exceeds total lines {total_lines}"),
        }
        .into());
    }
    let end = end_line.unwrap_or(total_lines);
    if start > end {
        return Err(ToolError::InvalidArguments {
            tool: "edit_file".to_string(),
            message: format!("start_line {start} is greater than end_line {end}"),
        }
        .into());
    }
    let end = end.min(total_lines);
    let range_start = start - 1;

    let scope = lines[range_start..end].join("\n");
    let count = scope.matches(find).count();
    if count != 1 {
        return Err(ToolError::NotExactlyOnce(format!(
            "find string appears {count} times in file (must appear exactly once)"
        ))
        .into());
    }
    let replaced_scope = scope.replacen(find, replace, 1);

    let mut rebuilt: Vec<&str> = lines[..range_start].to_vec();
    rebuilt.extend(replaced_scope.split('\n'));
    rebuilt.extend(lines[end..].iter().copied());
    Ok(rebuilt.join("\n"))
}

fn required_str(args: &JsonValue, field: &str) -> Result<String, RuntimeError> {
    args.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            ToolError::InvalidArguments {
                tool: "edit_file".to_string(),
                message: format!("missing '{field}'"),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn errors_with_the_exact_occurrence_count_message_when_not_unique() {
        let dir = std::env::temp_dir().join(format!("edit_file_test_{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("triple.txt");
        tokio::fs::write(&path, "x\nx\nx\n").await.unwrap();

        let args = serde_json::json!({
            "file_path": path.to_str().unwrap(),
            "find": "x",
            "replace": "y",
        });
        let err = run(args).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "find string appears 3 times in file (must appear exactly once)"
        );

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn replaces_a_unique_match() {
        let dir = std::env::temp_dir().join(format!("edit_file_test_unique_{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("unique.txt");
        tokio::fs::write(&path, "hello world\n").await.unwrap();

        let args = serde_json::json!({
            "file_path": path.to_str().unwrap(),
            "find": "world",
            "replace": "rust",
        });
        run(args).await.unwrap();
        let updated = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(updated, "hello rust\n");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn rejects_a_relative_file_path() {
        let args = serde_json::json!({
            "file_path": "relative/file.txt",
            "find": "x",
            "replace": "y",
        });
        let err = run(args).await.unwrap_err();
        assert!(err.to_string().contains("must be absolute"));
    }

    #[tokio::test]
    async fn scopes_the_search_to_the_given_line_range() {
        let dir = std::env::temp_dir().join(format!("edit_file_test_range_{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("ranged.txt");
        tokio::fs::write(&path, "needle\nother\nneedle\n").await.unwrap();

        let args = serde_json::json!({
            "file_path": path.to_str().unwrap(),
            "find": "needle",
            "replace": "found",
            "start_line": 2,
            "end_line": 3,
        });
        run(args).await.unwrap();
        let updated = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(updated, "needle\nother\nfound\n");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn preserves_crlf_line_endings() {
        let dir = std::env::temp_dir().join(format!("edit_file_test_crlf_{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("crlf.txt");
        tokio::fs::write(&path, "hello\r\nworld\r\n").await.unwrap();

        let args = serde_json::json!({
            "file_path": path.to_str().unwrap(),
            "find": "world",
            "replace": "rust",
        });
        run(args).await.unwrap();
        let updated = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(updated, "hello\r\nrust\r\n");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
