use std::io;

use crossterm::tty::IsTty;

/// Environment variable holding the `tracing` filter directives.
pub const LOG_ENV: &str = "DSH_LOG";
/// Filter used when `DSH_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "warn";

const INTERACTIVE_ENV: &str = "DSH_INTERACTIVE";
const PROMPT_ENV: &str = "DSH_PROMPT";

/// Start-up settings, read once from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellConfig {
    /// Whether to do terminal job control and print a prompt.
    pub interactive: bool,
    pub prompt: String,
}

impl ShellConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), io::stdin().is_tty())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>, stdin_is_tty: bool) -> Self {
        let interactive = match lookup(INTERACTIVE_ENV).as_deref().map(str::trim) {
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            _ => stdin_is_tty,
        };
        let prompt = lookup(PROMPT_ENV)
            .unwrap_or_else(|| format!("dsh-{}$ ", std::process::id()));

        Self { interactive, prompt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)], tty: bool) -> ShellConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ShellConfig::from_lookup(|key| vars.get(key).cloned(), tty)
    }

    #[test]
    fn defaults_follow_the_terminal() {
        assert!(config(&[], true).interactive);
        assert!(!config(&[], false).interactive);
    }

    #[test]
    fn default_prompt_names_the_pid() {
        let prompt = config(&[], true).prompt;
        assert_eq!(prompt, format!("dsh-{}$ ", std::process::id()));
    }

    #[test]
    fn environment_overrides() {
        let cfg = config(&[("DSH_INTERACTIVE", "0"), ("DSH_PROMPT", "> ")], true);
        assert!(!cfg.interactive);
        assert_eq!(cfg.prompt, "> ");
        assert!(config(&[("DSH_INTERACTIVE", "yes")], false).interactive);
        assert!(config(&[("DSH_INTERACTIVE", "maybe")], true).interactive);
    }
}
