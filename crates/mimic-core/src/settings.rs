//! Process-wide proxy settings.
//!
//! Settings are assembled once at startup, validated, and shared with every
//! request task behind an `Arc`. Nothing here is mutable after startup.

use std::fmt;

use regex::Regex;

use crate::error::{CoreError, Result};

/// Processing mode applied to every intercepted request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Forward traffic upstream and persist each exchange.
    Capture,
    /// Serve responses from the capture store without touching the upstream.
    #[default]
    Virtualize,
    /// Manufacture responses entirely from middleware; no upstream calls.
    Synthesize,
    /// Forward traffic upstream and transform responses through middleware.
    Modify,
}

impl Mode {
    /// Returns the lowercase name used in logs and the admin API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Capture => "capture",
            Mode::Virtualize => "virtualize",
            Mode::Synthesize => "synthesize",
            Mode::Modify => "modify",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable runtime configuration consumed by the engine and the frontend.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Active processing mode.
    pub mode: Mode,
    /// Hosts matching this pattern are decrypted on CONNECT.
    pub destination: Regex,
    /// Path to the middleware executable, if any.
    pub middleware: Option<String>,
    /// Upstream host override applied to every request when set.
    pub endpoint: Option<String>,
    /// Whether per-request debug logging is enabled.
    pub verbose: bool,
}

impl Settings {
    /// Validates and assembles the runtime settings.
    ///
    /// Synthesize and Modify cannot operate without middleware, and the
    /// destination pattern must compile; either problem is fatal at startup.
    pub fn new(
        mode: Mode,
        destination: &str,
        middleware: Option<String>,
        endpoint: Option<String>,
        verbose: bool,
    ) -> Result<Self> {
        let destination = Regex::new(destination)
            .map_err(|e| CoreError::Config(format!("invalid destination pattern: {e}")))?;

        let middleware = middleware.filter(|cmd| !cmd.is_empty());
        if middleware.is_none() && matches!(mode, Mode::Synthesize | Mode::Modify) {
            return Err(CoreError::Config(format!(
                "{mode} mode requires a middleware command"
            )));
        }

        Ok(Self {
            mode,
            destination,
            middleware,
            endpoint: endpoint.filter(|e| !e.is_empty()),
            verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_virtualize() {
        assert_eq!(Mode::default(), Mode::Virtualize);
    }

    #[test]
    fn mode_names() {
        assert_eq!(Mode::Capture.as_str(), "capture");
        assert_eq!(Mode::Virtualize.to_string(), "virtualize");
        assert_eq!(Mode::Synthesize.as_str(), "synthesize");
        assert_eq!(Mode::Modify.as_str(), "modify");
    }

    #[test]
    fn settings_accepts_capture_without_middleware() {
        let settings = Settings::new(Mode::Capture, ".", None, None, false).unwrap();
        assert_eq!(settings.mode, Mode::Capture);
        assert!(settings.middleware.is_none());
    }

    #[test]
    fn settings_rejects_synthesize_without_middleware() {
        let err = Settings::new(Mode::Synthesize, ".", None, None, false).unwrap_err();
        assert!(err.to_string().contains("middleware"));
    }

    #[test]
    fn settings_rejects_modify_with_empty_middleware() {
        let err =
            Settings::new(Mode::Modify, ".", Some(String::new()), None, false).unwrap_err();
        assert!(err.to_string().contains("middleware"));
    }

    #[test]
    fn settings_rejects_bad_destination_pattern() {
        let err = Settings::new(Mode::Virtualize, "(", None, None, false).unwrap_err();
        assert!(err.to_string().contains("destination"));
    }

    #[test]
    fn settings_normalizes_empty_endpoint() {
        let settings =
            Settings::new(Mode::Virtualize, ".", None, Some(String::new()), false).unwrap();
        assert!(settings.endpoint.is_none());
    }

    #[test]
    fn settings_matches_destination_hosts() {
        let settings = Settings::new(Mode::Virtualize, "api\\.test", None, None, false).unwrap();
        assert!(settings.destination.is_match("api.test"));
        assert!(!settings.destination.is_match("other.example"));
    }
}
