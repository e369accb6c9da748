use std::path::PathBuf;

use clap::Parser;

/// Prepares a stored conversation for the next model, even when it comes from another vendor.
///
/// Reads stored conversation records as JSON and prints the request fields for the
/// target vendor (`messages`, `system`, `tools`) on stdout.
#[derive(Debug, Parser)]
#[command(name = "switchover", version)]
pub struct Args {
    /// Model the conversation continues with, e.g. `claude-sonnet-4` or `google/gemini-2.5-pro`.
    #[arg(long, short = 'm', env = "SWITCHOVER_MODEL")]
    pub model: String,

    /// Model that produced the stored history. When omitted the history is always converted.
    #[arg(long, short = 'p')]
    pub previous_model: Option<String>,

    /// Path to the TOML configuration file.
    #[arg(long, short = 'c', env = "SWITCHOVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON file with the tool definitions offered to the model.
    #[arg(long)]
    pub tools: Option<PathBuf>,

    /// Stored conversation records. Reads stdin when omitted or `-`.
    pub input: Option<PathBuf>,

    /// Log filter, e.g. `info` or `messages=debug`.
    #[arg(long, env = "SWITCHOVER_LOG", default_value = "info")]
    pub log: String,
}

impl Args {
    /// The input path, or `None` for stdin.
    pub fn input_path(&self) -> Option<&PathBuf> {
        self.input.as_ref().filter(|path| path.as_os_str() != "-")
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Args;

    #[test]
    fn minimal_invocation() {
        let args = Args::try_parse_from(["switchover", "--model", "gpt-4o"]).unwrap();

        assert_eq!(args.model, "gpt-4o");
        assert_eq!(args.previous_model, None);
        assert_eq!(args.log, "info");
        assert!(args.input_path().is_none());
    }

    #[test]
    fn dash_means_stdin() {
        let args = Args::try_parse_from(["switchover", "-m", "claude-3-5-sonnet", "-p", "gpt-4o", "-"]).unwrap();

        assert_eq!(args.previous_model.as_deref(), Some("gpt-4o"));
        assert!(args.input_path().is_none());
    }

    #[test]
    fn model_is_required() {
        let result = Args::try_parse_from(["switchover", "history.json"]);

        assert!(result.is_err());
    }
}
