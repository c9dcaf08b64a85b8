// src/cli/handlers/commons.rs

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Environment variable and alias names: a letter or underscore, then word characters.
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Splits `NAME=value` at the first `=`. Returns `None` when there is no `=`.
pub fn split_assignment(raw: &str) -> Option<(&str, &str)> {
    raw.split_once('=')
}

/// Checks that `name` can be used as a variable or alias name.
pub fn validate_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(name)
    } else {
        Err(anyhow!(t!("validation.error.invalid_identifier"), name = name))
    }
}

/// Renders a value the way `alias` and `env` listings quote it.
pub fn quote_for_display(value: &str) -> String {
    shlex::try_quote(value)
        .map(|quoted| quoted.into_owned())
        .unwrap_or_else(|_| format!("{:?}", value))
}
