//! Command line of MSV processes.
//!
//! ```text
//! msv [-c config.toml] run
//! msv [-c config.toml] task <name> [-i '<json>' | -I] [-w <ms>] [--live]
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use msv_bridge::{Payload, TaskOptions};
use msv_config::Config;

use crate::{run_app, scoped_app, shadow_app, ApplicationOptions};

/// Prefix of environment variables overriding configuration keys.
pub const ENV_PREFIX: &str = "MSV";

#[derive(Parser, Debug)]
#[command(name = "msv", version, about = "Run MSV applications and their tasks")]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the application and serve until SIGINT/SIGTERM
    Run,
    /// Run a single task and print its result as JSON
    Task(TaskArgs),
}

#[derive(Args, Debug)]
pub struct TaskArgs {
    /// Task name
    pub name: String,

    /// Payload as inline JSON
    #[arg(short = 'i', long, value_name = "JSON", conflicts_with = "stdin")]
    pub input: Option<String>,

    /// Read the JSON payload from stdin
    #[arg(short = 'I', long)]
    pub stdin: bool,

    /// Give up waiting for the result after this many milliseconds
    #[arg(short, long, value_name = "MS")]
    pub wait: Option<u64>,

    /// Start the services in this process instead of running in shadow mode
    #[arg(long)]
    pub live: bool,
}

impl TaskArgs {
    /// Resolve the payload from `--input`, stdin, or an empty object.
    pub fn payload(&self, stdin: impl Read) -> anyhow::Result<Payload> {
        let raw = match (&self.input, self.stdin) {
            (Some(input), _) => input.clone(),
            (None, true) => {
                let mut raw = String::new();
                let mut stdin = stdin;
                stdin
                    .read_to_string(&mut raw)
                    .context("Failed to read payload from stdin")?;
                raw
            }
            (None, false) => return Ok(Payload::Object(Default::default())),
        };

        if raw.trim().is_empty() {
            bail!("Payload is empty");
        }
        serde_json::from_str(&raw).context("Payload is not valid JSON")
    }

    #[must_use]
    pub fn options(&self) -> TaskOptions {
        TaskOptions {
            wait: self.wait.map(Duration::from_millis),
        }
    }
}

/// Load the configuration file (or the basic configuration) and apply
/// `MSV__*` environment overrides.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let base = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::basic(),
    };
    Ok(base.with_env_overrides(ENV_PREFIX))
}

/// Execute a parsed command line against `options`.
///
/// The configuration in `options` is replaced by the one `cli` points at.
pub async fn execute(cli: Cli, options: ApplicationOptions) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let options = options.config(config);

    match cli.command {
        Command::Run => run_app(options).await?,
        Command::Task(args) => {
            let payload = args.payload(std::io::stdin().lock())?;
            let task_options = args.options();
            let name = args.name.clone();
            let call = move |app: std::sync::Arc<crate::Application>| async move {
                let result = app.run_with(&name, payload, task_options).await?;
                anyhow::Ok(result)
            };

            let result = if args.live {
                scoped_app(options, call).await?
            } else {
                shadow_app(options, call).await?
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    fn task_args(argv: &[&str]) -> TaskArgs {
        let cli = Cli::try_parse_from(argv.iter().copied()).unwrap();
        match cli.command {
            Command::Task(args) => args,
            Command::Run => panic!("expected task command"),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_task_with_inline_payload() {
        let args = task_args(&["msv", "task", "add", "-i", r#"{"a":1,"b":2}"#, "-w", "250"]);
        assert_eq!(args.name, "add");
        assert_eq!(args.payload(std::io::empty()).unwrap(), json!({ "a": 1, "b": 2 }));
        assert_eq!(args.options().wait, Some(Duration::from_millis(250)));
        assert!(!args.live);
    }

    #[test]
    fn test_payload_from_stdin() {
        let args = task_args(&["msv", "task", "echo", "-I"]);
        let payload = args.payload(r#"[1, 2, 3]"#.as_bytes()).unwrap();
        assert_eq!(payload, json!([1, 2, 3]));
    }

    #[test]
    fn test_payload_defaults_to_empty_object() {
        let args = task_args(&["msv", "task", "echo"]);
        assert_eq!(args.payload(std::io::empty()).unwrap(), json!({}));
        assert_eq!(args.options().wait, None);
    }

    #[test]
    fn test_invalid_payload_is_rejected() {
        let args = task_args(&["msv", "task", "echo", "-i", "{oops"]);
        assert!(args.payload(std::io::empty()).is_err());
    }

    #[test]
    fn test_input_conflicts_with_stdin() {
        assert!(Cli::try_parse_from(["msv", "task", "echo", "-i", "{}", "-I"]).is_err());
    }

    #[test]
    fn test_config_is_global() {
        let cli = Cli::try_parse_from(["msv", "run", "-c", "msv.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("msv.toml")));
        assert!(matches!(cli.command, Command::Run));
    }
}
