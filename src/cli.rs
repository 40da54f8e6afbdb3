//! Command-line arguments.
//!
//! ```text
//! websocksy [-l HOST] [-p PORT] [-b BACKEND] [-c KEY=VALUE]... [CONFIG]
//! ```
//!
//! A configuration file, when given, is loaded first; flags override its
//! `[core]` values and `-c` options are applied after its `[backend]` ones.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, parse_port};
use crate::error::Result;

/// WebSocket to raw socket gateway.
#[derive(Debug, Clone, Parser)]
#[command(name = "websocksy", version, about)]
pub struct Cli {
    /// Configuration file.
    #[arg(value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to listen on.
    #[arg(short = 'l', long, value_name = "HOST")]
    pub listen: Option<String>,

    /// Port to listen on.
    #[arg(short = 'p', long, value_name = "PORT", value_parser = parse_port)]
    pub port: Option<u16>,

    /// Peer resolution backend.
    #[arg(short = 'b', long, value_name = "BACKEND")]
    pub backend: Option<String>,

    /// Backend option, may be repeated.
    #[arg(short = 'c', long = "option", value_name = "KEY=VALUE", value_parser = parse_option)]
    pub options: Vec<(String, String)>,
}

impl Cli {
    /// Builds the gateway configuration.
    ///
    /// # Errors
    ///
    /// Propagates configuration file errors.
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::new(),
        };

        if let Some(listen) = self.listen {
            config = config.with_listen(listen);
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(backend) = self.backend {
            config = config.with_backend(backend);
        }
        for (key, value) in self.options {
            config = config.with_backend_option(key, value);
        }

        Ok(config)
    }
}

/// Splits a `-c` argument at its first `=`.
fn parse_option(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{value}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["websocksy"]).unwrap();
        assert_eq!(cli.into_config().unwrap(), Config::new());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "websocksy",
            "-l",
            "127.0.0.1",
            "-p",
            "9001",
            "-b",
            "defaultpeer",
            "-c",
            "host=tcp://localhost",
            "-c",
            "framing-config=a=b",
        ])
        .unwrap();

        let config = cli.into_config().unwrap();
        assert_eq!(config.listen(), "127.0.0.1");
        assert_eq!(config.port(), 9001);
        assert_eq!(config.backend(), "defaultpeer");
        assert_eq!(config.backend_options()[1], ("framing-config".to_string(), "a=b".to_string()));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from(["websocksy", "-c", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["websocksy", "-c", "=x"]).is_err());
        assert!(Cli::try_parse_from(["websocksy", "-p", "65536"]).is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[core]\nport = 7000\nlisten = ::1\n[backend]\nport = 1").unwrap();

        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["websocksy", "-p", "7001", "-c", "port=2", path]).unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.port(), 7001);
        assert_eq!(config.listen(), "::1");
        assert_eq!(
            config.backend_options(),
            &[
                ("port".to_string(), "1".to_string()),
                ("port".to_string(), "2".to_string()),
            ]
        );
    }
}
