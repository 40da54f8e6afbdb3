//! Gateway configuration.
//!
//! A [`Config`] is built once at startup, from command-line flags or a
//! configuration file, and passed by reference to the listener and the
//! peer backend.
//!
//! # File Format
//!
//! ```ini
//! # Comments start with '#' or ';'
//! [core]
//! listen = ::
//! port = 8001
//! backend = defaultpeer
//!
//! [backend]
//! host = tcp://localhost
//! port = 5900
//! framing = newline
//! ```
//!
//! Keys before the first section header belong to `[core]`. Every
//! `[backend]` entry is handed to the backend's `configure` in file order.
//!
//! # Example
//!
//! ```ignore
//! use websocksy::Config;
//!
//! let config = Config::new()
//!     .with_listen("127.0.0.1")
//!     .with_port(8080)
//!     .with_backend_option("host", "unix:///run/app.sock");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::peer::DefaultPeer;

// ============================================================================
// Constants
// ============================================================================

/// Default listen host: the IPv6 wildcard, which also accepts IPv4.
pub const DEFAULT_LISTEN: &str = "::";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8001;

// ============================================================================
// Config
// ============================================================================

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    listen: String,
    port: u16,
    backend: String,
    backend_options: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Config {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            port: DEFAULT_PORT,
            backend: DefaultPeer::NAME.to_string(),
            backend_options: Vec::new(),
        }
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::ConfigFile`] for a malformed line or unknown key
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        debug!(path = %path.display(), "Reading configuration file");
        Self::parse(&text, path)
    }

    /// Parses configuration file contents; `path` is only used in errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFile`] with the 1-based line number of the
    /// first offending line.
    pub fn parse(text: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::new();
        let mut section = Section::Core;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let Some(name) = name.strip_suffix(']') else {
                    return Err(Error::config_file(path, line_no, "unterminated section header"));
                };
                section = match name.trim() {
                    "core" => Section::Core,
                    "backend" => Section::Backend,
                    other => {
                        return Err(Error::config_file(
                            path,
                            line_no,
                            format!("unknown section '{other}'"),
                        ));
                    }
                };
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::config_file(path, line_no, "expected 'key = value'"));
            };
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() {
                return Err(Error::config_file(path, line_no, "empty key"));
            }

            match section {
                Section::Core => config
                    .set_core(key, value)
                    .map_err(|message| Error::config_file(path, line_no, message))?,
                Section::Backend => {
                    config.backend_options.push((key.to_string(), value.to_string()));
                }
            }
        }

        Ok(config)
    }

    /// Applies one `[core]` key.
    fn set_core(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        match key {
            "listen" => self.listen = value.to_string(),
            "port" => self.port = parse_port(value)?,
            "backend" => self.backend = value.to_string(),
            _ => return Err(format!("unknown core option '{key}'")),
        }
        Ok(())
    }
}

/// Parses a listen port.
pub(crate) fn parse_port(value: &str) -> std::result::Result<u16, String> {
    value
        .parse()
        .map_err(|_| format!("invalid port '{value}'"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Core,
    Backend,
}

// ============================================================================
// Builder Methods
// ============================================================================

impl Config {
    /// Sets the listen host.
    #[inline]
    #[must_use]
    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = listen.into();
        self
    }

    /// Sets the listen port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Selects the peer backend by name.
    #[inline]
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Appends a backend option; later options override earlier ones.
    #[inline]
    #[must_use]
    pub fn with_backend_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.backend_options.push((key.into(), value.into()));
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Config {
    /// Listen host.
    #[inline]
    #[must_use]
    pub fn listen(&self) -> &str {
        &self.listen
    }

    /// Listen port.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Backend name.
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Backend options in the order they were given.
    #[inline]
    #[must_use]
    pub fn backend_options(&self) -> &[(String, String)] {
        &self.backend_options
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.listen(), "::");
        assert_eq!(config.port(), 8001);
        assert_eq!(config.backend(), "defaultpeer");
        assert!(config.backend_options().is_empty());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .with_listen("127.0.0.1")
            .with_port(9000)
            .with_backend_option("host", "udp://10.0.0.1")
            .with_backend_option("port", "53");

        assert_eq!(config.listen(), "127.0.0.1");
        assert_eq!(config.port(), 9000);
        assert_eq!(
            config.backend_options(),
            &[
                ("host".to_string(), "udp://10.0.0.1".to_string()),
                ("port".to_string(), "53".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_sections() {
        let text = "\
# gateway
[core]
listen = 127.0.0.1
port=8080

; peer
[backend]
host = tcp://localhost
framing-config = \\n
";
        let config = Config::parse(text, "test.conf").unwrap();
        assert_eq!(config.listen(), "127.0.0.1");
        assert_eq!(config.port(), 8080);
        assert_eq!(config.backend_options().len(), 2);
        assert_eq!(config.backend_options()[1].1, "\\n");
    }

    #[test]
    fn test_keys_before_section_are_core() {
        let config = Config::parse("port = 1234\n", "test.conf").unwrap();
        assert_eq!(config.port(), 1234);
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let cases = [
            ("[core]\nport = http\n", 2),
            ("[core]\n\ncolour = blue\n", 3),
            ("no equals sign\n", 1),
            ("[plugins]\n", 1),
            ("[core\n", 1),
            ("= value\n", 1),
        ];

        for (text, line) in cases {
            match Config::parse(text, "test.conf") {
                Err(Error::ConfigFile { line: got, .. }) => assert_eq!(got, line, "{text:?}"),
                other => panic!("expected config file error for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[core]\nbackend = defaultpeer\n[backend]\nport = 5901").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.backend(), "defaultpeer");
        assert_eq!(
            config.backend_options(),
            &[("port".to_string(), "5901".to_string())]
        );
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(dir.path().join("absent.conf")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
