use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "toolgrade",
    version,
    about = "Generate, run, and grade LLM-authored tests against MCP tool servers"
)]
pub struct Cli {
    /// Configuration file; defaults to the nearest toolgrade.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Test cases generated per tool.
    #[arg(long, global = true)]
    pub tests_per_tool: Option<usize>,
    /// Per-test invocation timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
    /// Connection timeout in milliseconds.
    #[arg(long, global = true)]
    pub connect_timeout_ms: Option<u64>,
    /// Only test these tools (repeatable).
    #[arg(long = "tool-allowlist", global = true)]
    pub tool_allowlist: Vec<String>,
    /// Never test these tools (repeatable).
    #[arg(long = "tool-blocklist", global = true)]
    pub tool_blocklist: Vec<String>,
    /// Report format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
    /// Shorthand for `--format json`; errors are also emitted as JSON.
    #[arg(long, global = true)]
    pub json: bool,
    /// Write the report to a file instead of stdout.
    #[arg(long, global = true, value_name = "PATH")]
    pub output: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Markdown,
}

#[derive(Debug, Eq, PartialEq, Subcommand)]
pub enum Command {
    /// Generate and run tests against one or more servers.
    Run {
        /// Registry names or literal addresses; defaults to `run.servers`.
        servers: Vec<String>,
        /// Test every server in the registry.
        #[arg(long, conflicts_with = "servers")]
        all: bool,
    },
    /// Connect to a server and print its tools.
    ListTools {
        /// Registry name or literal address.
        server: String,
    },
    /// Manage toolgrade configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Eq, PartialEq, Subcommand)]
pub enum ConfigCommand {
    /// Emit the default toolgrade.toml configuration.
    Default,
}
