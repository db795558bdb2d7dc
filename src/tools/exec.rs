//! `exec` native tool (spec.md §4.6): runs a shell command attached to a
//! pty, tail-truncates captured output, and requires an absolute working
//! directory so relative-path ambiguity never reaches the shell.
//!
//! Grounded on the teacher's `bash_tool` (`src/tools/claude_code.rs`): same
//! "resolve args, spawn, cap/trim output" shape, adapted to a pty-attached
//! child (so interactive programs that detect a tty behave the same way
//! they would in the real shell) via `portable-pty`, the crate the pack's
//! `zhubby-moltis` manifest reaches for the same job.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use portable_pty::{CommandBuilder, PtySize, native_pty_system};
use serde_json::Value as JsonValue;
use tokio::time::{Duration, timeout};

use crate::error::{RuntimeError, ToolError};
use crate::value::{NativeTool, Value};

pub fn tool(default_timeout_secs: u64, output_cap_bytes: usize) -> Arc<NativeTool> {
    Arc::new(NativeTool {
        name: "exec".to_string(),
        description: "Execute a shell command in a pty-attached subprocess and return its output."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "working_directory": {"type": "string", "description": "Absolute path"},
                "timeout_secs": {"type": "integer"},
            },
            "required": ["command", "working_directory"],
        }),
        invoke: Arc::new(move |args: JsonValue| {
            Box::pin(run(args, default_timeout_secs, output_cap_bytes))
        }),
    })
}

async fn run(
    args: JsonValue,
    default_timeout_secs: u64,
    output_cap_bytes: usize,
) -> Result<Value, RuntimeError> {
    let command = args
        .get("command")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: "exec".to_string(),
            message: "missing 'command'".to_string(),
        })?
        .to_string();

    let working_directory = args
        .get("working_directory")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: "exec".to_string(),
            message: "missing 'working_directory'".to_string(),
        })?
        .to_string();

    if !Path::new(&working_directory).is_absolute() {
        return Err(ToolError::InvalidArguments {
            tool: "exec".to_string(),
            message: format!("working_directory must be absolute, got '{working_directory}'"),
        }
        .into());
    }

    let timeout_secs = args
        .get("timeout_secs")
        .and_then(|v| v.as_u64())
        .unwrap_or(default_timeout_secs);

    let handle = tokio::task::spawn_blocking(move || spawn_and_capture(&command, &working_directory, output_cap_bytes));

    let result = timeout(Duration::from_secs(timeout_secs), handle).await;
    match result {
        Ok(Ok(Ok((output, exit_code, truncated)))) => Ok(Value::String(build_envelope(output, exit_code, truncated))),
        Ok(Ok(Err(err))) => Err(ToolError::Io(err).into()),
        Ok(Err(join_err)) => Err(ToolError::Invocation(join_err.to_string()).into()),
        Err(_) => Err(ToolError::Invocation(format!("command timed out after {timeout_secs}s")).into()),
    }
}

fn build_envelope(output: String, exit_code: u32, truncated: bool) -> String {
    if truncated {
        serde_json::json!({"output": output, "exitCode": exit_code, "truncated": true}).to_string()
    } else {
        serde_json::json!({"output": output, "exitCode": exit_code}).to_string()
    }
}

/// Disabling pagers/prompts (spec.md §4.6) prevents a subprocess from
/// blocking forever on input the pty will never supply.
const NONINTERACTIVE_ENV: &[(&str, &str)] = &[
    ("PAGER", "cat"),
    ("GIT_PAGER", "cat"),
    ("GIT_TERMINAL_PROMPT", "0"),
];

fn spawn_and_capture(command: &str, working_directory: &str, output_cap_bytes: usize) -> Result<(String, u32, bool), String> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize { rows: 24, cols: 120, pixel_width: 0, pixel_height: 0 })
        .map_err(|err| err.to_string())?;

    let mut cmd = CommandBuilder::new("bash");
    cmd.arg("-c");
    cmd.arg(command);
    cmd.cwd(working_directory);
    for (key, value) in NONINTERACTIVE_ENV {
        cmd.env(key, value);
    }

    let mut child = pair.slave.spawn_command(cmd).map_err(|err| err.to_string())?;
    drop(pair.slave);

    let mut reader = pair.master.try_clone_reader().map_err(|err| err.to_string())?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(|err| err.to_string())?;
    let status = child.wait().map_err(|err| err.to_string())?;

    let text = String::from_utf8_lossy(&buf).into_owned();
    let (output, truncated) = tail_truncate(&text, output_cap_bytes);
    Ok((output, status.exit_code(), truncated))
}

/// Keeps the last `cap` bytes of `text`, aligned to a char boundary
/// (spec.md §4.6 "~50 KiB tail truncation"), reporting whether it had to.
/// Shared with `grep`, which applies the same cap to its own output.
pub(crate) fn tail_truncate(text: &str, cap: usize) -> (String, bool) {
    if text.len() <= cap {
        return (text.to_string(), false);
    }
    let start = text.len() - cap;
    let mut boundary = start;
    while boundary < text.len() && !text.is_char_boundary(boundary) {
        boundary += 1;
    }
    (format!("(truncated)\n{}", &text[boundary..]), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_truncate_keeps_only_the_end() {
        let text = "a".repeat(100);
        let (result, truncated) = tail_truncate(&text, 10);
        assert!(truncated);
        assert!(result.starts_with("(truncated)\n"));
        assert_eq!(result.len(), "(truncated)\n".len() + 10);
    }

    #[test]
    fn tail_truncate_is_a_no_op_under_the_cap() {
        let (result, truncated) = tail_truncate("short", 100);
        assert_eq!(result, "short");
        assert!(!truncated);
    }

    #[tokio::test]
    async fn rejects_relative_working_directory() {
        let args = serde_json::json!({"command": "echo hi", "working_directory": "relative/path"});
        let err = run(args, 5, 1024).await.unwrap_err();
        assert!(err.to_string().contains("must be absolute"));
    }

    #[tokio::test]
    async fn reports_output_and_exit_code() {
        let dir = std::env::temp_dir();
        let args = serde_json::json!({
            "command": "echo hi",
            "working_directory": dir.to_str().unwrap(),
        });
        let Value::String(envelope) = run(args, 5, 1024).await.unwrap() else {
            panic!("expected a string envelope");
        };
        let parsed: JsonValue = serde_json::from_str(&envelope).unwrap();
        assert_eq!(parsed["exitCode"], 0);
        assert!(parsed["output"].as_str().unwrap().contains("hi"));
        assert!(parsed.get("truncated").is_none());
    }
}
