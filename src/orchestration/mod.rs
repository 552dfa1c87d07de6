//! Container engine orchestration
//!
//! The pipeline talks to the engine through [`ContainerEngine`]; the
//! shipped implementation shells out to the docker or podman CLI.

mod cli_engine;
mod factory;
mod runtime;

pub use cli_engine::CliEngine;
pub use factory::create_engine;
pub use runtime::ContainerEngine;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Output lines kept in build error messages
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Last `BUILD_ERROR_TAIL_LINES` lines of stdout followed by stderr
pub(crate) fn build_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let start = lines.len().saturating_sub(BUILD_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Whether engine output says the daemon could not be contacted.
pub(crate) fn is_connection_error(output: &str) -> bool {
    let lower = output.to_ascii_lowercase();
    lower.contains("cannot connect to the docker daemon")
        || lower.contains("connection refused")
        || lower.contains("unable to connect to podman")
        || lower.contains("is the docker daemon running")
}

/// Forward each stdout/stderr line of `child` to `on_output` until both close.
///
/// Returns the stdout lines followed by the stderr lines, for error reporting.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let (mut lines, stderr_lines) = tokio::join!(
        forward_lines(child.stdout.take(), on_output),
        forward_lines(child.stderr.take(), on_output),
    );
    lines.extend(stderr_lines);
    lines
}

async fn forward_lines<R: AsyncRead + Unpin>(
    stream: Option<R>,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let Some(stream) = stream else {
        return Vec::new();
    };

    let mut reader = BufReader::new(stream).lines();
    let mut seen = Vec::new();
    while let Ok(Some(line)) = reader.next_line().await {
        on_output(line.clone());
        seen.push(line);
    }
    seen
}
