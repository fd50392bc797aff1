//! Identifier rules shared by stacks, variables, providers and resources.

use super::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("identifier pattern is valid")
});

/// Check that `name` is a usable identifier. Dots are excluded so that
/// `{{ref.<id>.<path>}}` splits unambiguously.
pub fn check_identifier(what: &'static str, name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier {
            what,
            name: name.to_string(),
        })
    }
}
