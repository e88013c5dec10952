//! Custom bank definitions authored by the user.

use super::builtin::is_builtin;
use crate::error::{Error, Result};
use crate::store::NamedBank;

/// Most entries a custom bank may hold
pub const MAX_CUSTOM_ENTRIES: usize = 20;

/// Build a custom bank from a name and raw text, one fact per line.
///
/// Lines are trimmed and blank lines dropped. Rejected before any embedding
/// work if the name is blank or taken by a built-in bank, or if the text
/// holds no facts or more than [`MAX_CUSTOM_ENTRIES`].
pub fn parse_custom_bank(name: &str, raw: &str) -> Result<NamedBank> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidBank("Bank name must not be empty".into()));
    }
    if is_builtin(name) {
        return Err(Error::InvalidBank(format!(
            "'{}' is a built-in bank",
            name
        )));
    }

    let content: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if content.is_empty() {
        return Err(Error::InvalidBank(format!("Bank '{}' has no entries", name)));
    }
    if content.len() > MAX_CUSTOM_ENTRIES {
        return Err(Error::BankTooLarge {
            entries: content.len(),
            max: MAX_CUSTOM_ENTRIES,
        });
    }

    Ok(NamedBank::new(name, content))
}
