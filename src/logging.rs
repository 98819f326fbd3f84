//! Tracing setup and secret masking

use std::fmt;
use tracing_subscriber::{fmt as fmt_layer, prelude::*, EnvFilter};

/// Initialize tracing with the configured level and format
///
/// `RUST_LOG` takes precedence over `level`. `format` is `json` or
/// anything else for human-readable text. Safe to call more than once;
/// only the first call installs a subscriber.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer::layer().json().with_target(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer::layer().with_target(true))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("Warning: tracing already initialized: {}", e);
    }
}

/// Masked view of a secret for logs and displays
///
/// Shows the first 4 characters followed by `***`; short values are fully
/// masked.
#[derive(Clone, Copy)]
pub struct Sensitive<'a> {
    inner: &'a str,
}

impl<'a> Sensitive<'a> {
    pub fn new(value: &'a str) -> Self {
        Self { inner: value }
    }
}

impl fmt::Display for Sensitive<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const VISIBLE: usize = 4;
        if self.inner.chars().count() <= VISIBLE * 2 {
            return write!(f, "***");
        }
        let prefix: String = self.inner.chars().take(VISIBLE).collect();
        write!(f, "{}***", prefix)
    }
}

impl fmt::Debug for Sensitive<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

pub fn mask_secret(value: &str) -> String {
    Sensitive::new(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_secret_keeps_prefix_only() {
        assert_eq!(mask_secret("abcd~efgh.ijkl-mnop"), "abcd***");
    }

    #[test]
    fn test_short_secret_fully_masked() {
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret(""), "***");
    }

    #[test]
    fn test_debug_is_masked() {
        let rendered = format!("{:?}", Sensitive::new("very-secret-value"));
        assert_eq!(rendered, "\"very***\"");
    }

    #[test]
    fn test_init_tracing_twice_does_not_panic() {
        init_tracing("debug", "text");
        init_tracing("info", "json");
    }
}
