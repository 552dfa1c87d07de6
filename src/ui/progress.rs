//! Image build progress with CI fallback

use super::context::UiContext;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::debug;

/// Progress display for container image builds.
///
/// Understands the step markers of the classic docker builder
/// (`Step N/M : ...`), podman (`STEP N/M: ...`) and BuildKit
/// (`#7 [2/2] RUN ...`). Interactive terminals get a progress bar; other
/// output is forwarded to the debug log.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = ctx.use_fancy_output().then(|| {
            let bar = ProgressBar::new(0);
            let style = ProgressStyle::default_bar()
                .template("  {spinner:.cyan} {prefix}  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                .progress_chars("━╸─");
            bar.set_style(style);
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });
        Self { bar }
    }

    /// Feed one line of engine output
    pub fn on_line(&self, line: String) {
        debug!(target: "stagecraft::engine", "{}", line);

        let Some(ref bar) = self.bar else {
            return;
        };
        if let Some((n, total, instruction)) = parse_step_line(&line) {
            bar.set_length(total);
            bar.set_position(n);
            bar.set_message(instruction.to_string());
        } else {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                let display: String = trimmed.chars().take(60).collect();
                bar.set_message(display);
            }
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// Parse a build step marker into (step, total, instruction)
fn parse_step_line(line: &str) -> Option<(u64, u64, &str)> {
    let line = line.trim_start();

    if let Some(rest) = line
        .strip_prefix("STEP ")
        .or_else(|| line.strip_prefix("Step "))
    {
        let (counts, instruction) = rest.split_once(':')?;
        let (n, total) = counts.trim().split_once('/')?;
        return Some((n.parse().ok()?, total.parse().ok()?, instruction.trim()));
    }

    // BuildKit: "#7 [2/2] RUN apt-get update"
    let rest = line.strip_prefix('#')?;
    let open = rest.find('[')?;
    let close = rest[open..].find(']')? + open;
    let (n, total) = rest[open + 1..close].trim().split_once('/')?;
    Some((
        n.trim().parse().ok()?,
        total.trim().parse().ok()?,
        rest[close + 1..].trim(),
    ))
}
