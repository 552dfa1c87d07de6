//! Terminal detection

use std::io::IsTerminal;

/// Environment variables set by common CI systems
const CI_MARKERS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "JENKINS_URL",
];

/// Decides between progress bars and plain line output
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    interactive: bool,
}

impl UiContext {
    /// Inspect stdout and the environment
    pub fn detect() -> Self {
        let dumb_term = std::env::var("TERM").is_ok_and(|t| t == "dumb");
        let in_ci = CI_MARKERS.iter().any(|var| std::env::var_os(var).is_some());

        Self {
            interactive: std::io::stdout().is_terminal() && !dumb_term && !in_ci,
        }
    }

    /// Plain output regardless of the terminal (tests, `--plan-only` pipes)
    pub fn non_interactive() -> Self {
        Self { interactive: false }
    }

    /// Whether progress bars may be drawn
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_context() {
        assert!(!UiContext::non_interactive().use_fancy_output());
    }
}
