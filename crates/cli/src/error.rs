// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-friendly error display with context and suggestions.

use std::fmt;
use std::path::Path;
use vl_adapters::SecretError;
use vl_core::ConfigError;
use vl_storage::StoreError;

/// Error with context and recovery suggestions for user-friendly display.
#[derive(Debug)]
pub struct VlError {
    /// What went wrong
    pub message: String,
    /// Why it might have happened
    pub context: Vec<String>,
    /// How to fix it
    pub suggestions: Vec<String>,
    /// Original error if any
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl VlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
            source: None,
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for VlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            for ctx in &self.context {
                writeln!(f, "  -> {}", ctx)?;
            }
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "suggestions:")?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for VlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Builders for the failures an operator can act on
impl VlError {
    pub fn config(path: &Path, err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::Io { .. } => "Check the path passed with --config or VL_CONFIG",
            ConfigError::Parse(_) => "Fix the TOML syntax or remove the unknown key",
            ConfigError::Invalid(_) => "Adjust the value named above",
        };
        VlError::new(format!("cannot use config {}", path.display()))
            .with_context(err.to_string())
            .with_suggestion(hint)
            .with_suggestion("Print the effective defaults: vl config")
            .with_source(err)
    }

    pub fn invalid_defaults(err: ConfigError) -> Self {
        VlError::new("built-in configuration is invalid")
            .with_context(err.to_string())
            .with_suggestion("Pass a config file with --config")
            .with_source(err)
    }

    pub fn secret(name: &str, err: SecretError) -> Self {
        VlError::new(format!("secret {} is unavailable", name))
            .with_context(err.to_string())
            .with_suggestion(format!(
                "With the env backend: export {}=...",
                name
            ))
            .with_suggestion(format!(
                "With the dir backend: write the value to <secrets.dir>/{}",
                name
            ))
            .with_source(err)
    }

    pub fn database(err: StoreError) -> Self {
        VlError::new("database unavailable")
            .with_context(err.to_string())
            .with_suggestion("Check that PostgreSQL is running and the URL secret is correct")
            .with_suggestion("Apply the schema with: vl migrate")
            .with_source(err)
    }
}
