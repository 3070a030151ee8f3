//! External command execution shared by the CLI-backed collaborators.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{HarnessError, HarnessResult};

/// Build an owned argv vector from borrowed parts.
pub(crate) fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// Render a command line for logs and error messages.
pub(crate) fn render(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

/// Run `program` with `args`, returning combined stdout and stderr.
///
/// A non-zero exit becomes an `ExternalCommand` error carrying the
/// rendered command line, the exit status, and the combined output.
pub(crate) async fn run_command(program: &str, args: &[&str]) -> HarnessResult<String> {
    let rendered = render(program, args);
    tracing::debug!("running `{rendered}`");
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|err| HarnessError::ExternalCommand {
            command: rendered.clone(),
            reason: err.to_string(),
        })?;
    combine(rendered, output)
}

/// Like [`run_command`], feeding `input` to the child's stdin.
pub(crate) async fn run_command_with_stdin(
    program: &str,
    args: &[&str],
    input: &str,
) -> HarnessResult<String> {
    let rendered = render(program, args);
    tracing::debug!("running `{rendered}` with {} bytes on stdin", input.len());
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| HarnessError::ExternalCommand {
            command: rendered.clone(),
            reason: err.to_string(),
        })?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .await
            .map_err(|err| HarnessError::ExternalCommand {
                command: rendered.clone(),
                reason: format!("failed to write stdin: {err}"),
            })?;
    }
    let output = child
        .wait_with_output()
        .await
        .map_err(|err| HarnessError::ExternalCommand {
            command: rendered.clone(),
            reason: err.to_string(),
        })?;
    combine(rendered, output)
}

fn combine(rendered: String, output: std::process::Output) -> HarnessResult<String> {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    if output.status.success() {
        Ok(combined)
    } else {
        Err(HarnessError::ExternalCommand {
            command: rendered,
            reason: format!("{}: {}", output.status, combined.trim()),
        })
    }
}
