//! Resolution of user-supplied server addresses into transport configs.

use std::path::Path;

use crate::{ConnectionError, HttpConfig, ServerRegistry, StdioConfig, TcpConfig, TransportConfig};

const PYPI_PREFIX: &str = "pypi:";

/// How an address was recognised.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TargetSource {
    /// A named registry entry.
    Registry(String),
    /// An `http://` or `https://` URL.
    Url,
    /// A `host:port` literal.
    Socket,
    /// A script run through an interpreter chosen by its extension.
    Script {
        /// Interpreter command line prefix.
        interpreter: String,
    },
    /// A command or executable path run directly.
    Executable,
    /// A package fetched and run by a package runner.
    Package,
}

/// A transport configuration plus how it was derived.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedTarget {
    /// Transport to open.
    pub transport: TransportConfig,
    /// Which resolution rule matched.
    pub source: TargetSource,
}

/// Resolves an address or registry name into a transport.
///
/// Tried in order: registry name, HTTP URL, `host:port`, script or
/// executable reference, package reference.
pub fn resolve_target(
    address: &str,
    registry: &ServerRegistry,
) -> Result<ResolvedTarget, ConnectionError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ConnectionError::NoServerIdentified(
            "empty server address".to_string(),
        ));
    }
    if let Some(transport) = registry.get(address) {
        return Ok(ResolvedTarget {
            transport: transport.clone(),
            source: TargetSource::Registry(address.to_string()),
        });
    }
    if address.starts_with("http://") || address.starts_with("https://") {
        return Ok(ResolvedTarget {
            transport: TransportConfig::Http(HttpConfig {
                url: address.to_string(),
                auth_token: None,
            }),
            source: TargetSource::Url,
        });
    }
    if is_socket_address(address) {
        return Ok(ResolvedTarget {
            transport: TransportConfig::Tcp(TcpConfig {
                address: address.to_string(),
            }),
            source: TargetSource::Socket,
        });
    }

    let mut parts = address.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(ConnectionError::NoServerIdentified(address.to_string()));
    };
    let args: Vec<&str> = parts.collect();

    if let Some(interpreter) = interpreter_for(program) {
        let mut words = interpreter.split_whitespace();
        let command = words.next().unwrap_or(interpreter);
        let config = StdioConfig::new(command)
            .with_args(words)
            .with_args([program])
            .with_args(args);
        return Ok(ResolvedTarget {
            transport: TransportConfig::Stdio(config),
            source: TargetSource::Script {
                interpreter: interpreter.to_string(),
            },
        });
    }
    if is_path_like(program) || !args.is_empty() {
        return Ok(ResolvedTarget {
            transport: TransportConfig::Stdio(StdioConfig::new(program).with_args(args)),
            source: TargetSource::Executable,
        });
    }
    if let Some(package) = program.strip_prefix(PYPI_PREFIX) {
        if package.is_empty() {
            return Err(ConnectionError::NoServerIdentified(address.to_string()));
        }
        return Ok(ResolvedTarget {
            transport: TransportConfig::Stdio(StdioConfig::new("uvx").with_args([package])),
            source: TargetSource::Package,
        });
    }
    if is_package_name(program) {
        return Ok(ResolvedTarget {
            transport: TransportConfig::Stdio(StdioConfig::new("npx").with_args(["-y", program])),
            source: TargetSource::Package,
        });
    }
    Err(ConnectionError::NoServerIdentified(address.to_string()))
}

fn interpreter_for(program: &str) -> Option<&'static str> {
    let extension = Path::new(program).extension()?.to_str()?;
    match extension.to_ascii_lowercase().as_str() {
        "py" => Some("python3"),
        "js" | "mjs" | "cjs" => Some("node"),
        "ts" => Some("npx -y tsx"),
        "sh" => Some("sh"),
        "rb" => Some("ruby"),
        _ => None,
    }
}

fn is_path_like(program: &str) -> bool {
    program.starts_with('/')
        || program.starts_with("./")
        || program.starts_with("../")
        || program.starts_with('~')
        || Path::new(program).is_file()
}

fn is_package_name(program: &str) -> bool {
    program
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '/' | '-' | '_' | '.'))
}

/// Accepts `host:port` and `[v6]:port`; rejects anything path-like.
fn is_socket_address(address: &str) -> bool {
    if address.contains(char::is_whitespace) || address.contains('/') || address.contains('\\') {
        return false;
    }
    let Some((host, port)) = address.rsplit_once(':') else {
        return false;
    };
    if host.is_empty() || port.parse::<u16>().is_err() {
        return false;
    }
    if let Some(inner) = host.strip_prefix('[') {
        return inner.strip_suffix(']').is_some_and(|inner| !inner.is_empty());
    }
    !host.contains(':')
}

#[cfg(test)]
#[path = "../tests/internal/target_tests.rs"]
mod tests;
