//! Password captured once per run
//!
//! The value is handed to child processes through their stdin, never on the
//! command line, and never shows up in `Debug` output or logs.

use std::fmt;

use crate::error::{PasswordPromptSnafu, Result};

pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Bytes fed to an interactive `sudo -S` style prompt.
    pub fn as_stdin_line(&self) -> Vec<u8> {
        let mut line = self.0.clone().into_bytes();
        line.push(b'\n');
        line
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

/// Source of the user's login password.
pub trait PasswordPrompt {
    fn prompt(&self) -> Result<Secret>;
}

/// Interactive terminal prompt.
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn prompt(&self) -> Result<Secret> {
        dialoguer::Password::new()
            .with_prompt("Enter your password")
            .allow_empty_password(true)
            .interact()
            .map(Secret::new)
            .map_err(|e| {
                PasswordPromptSnafu {
                    message: e.to_string(),
                }
                .build()
            })
    }
}
