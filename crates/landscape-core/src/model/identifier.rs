// ── FriendlyIdentifier ──
//
// Stable short/long naming for a resource. The full identifier can be
// re-resolved after discovery, so it lives behind an `ArcSwap` and reads
// never block.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;

use crate::error::CoreError;

/// Short and long names for one landscape resource.
///
/// `identity()` is the key used everywhere in the landscape: the first
/// capture group of the extract pattern when one is set, else the hint,
/// else the full identifier.
#[derive(Debug)]
pub struct FriendlyIdentifier {
    full: ArcSwap<String>,
    hint: String,
    pattern: Option<Regex>,
}

impl FriendlyIdentifier {
    /// Build an identifier with no extract pattern.
    pub fn new(full: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            full: ArcSwap::from_pointee(full.into()),
            hint: hint.into(),
            pattern: None,
        }
    }

    /// Build an identifier whose identity is extracted from `full`.
    ///
    /// The pattern must compile and must match `full` now.
    pub fn with_pattern(
        full: impl Into<String>,
        hint: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, CoreError> {
        let full = full.into();
        let regex = Regex::new(pattern).map_err(|e| {
            CoreError::semantic(format!("Invalid identity pattern '{pattern}': {e}"))
        })?;

        if !anchored_match(&regex, &full) {
            return Err(CoreError::semantic(format!(
                "The identifier '{full}' is not compatible with the identity pattern '{pattern}'."
            )));
        }

        Ok(Self {
            full: ArcSwap::from_pointee(full),
            hint: hint.into(),
            pattern: Some(regex),
        })
    }

    pub fn full_identifier(&self) -> Arc<String> {
        self.full.load_full()
    }

    pub fn hint(&self) -> &str {
        &self.hint
    }

    pub fn identity(&self) -> String {
        let full = self.full.load();

        if let Some(captured) = self
            .pattern
            .as_ref()
            .filter(|re| anchored_match(re, &full))
            .and_then(|re| re.captures(&full))
            .and_then(|caps| caps.get(1))
        {
            return captured.as_str().to_owned();
        }

        if self.hint.is_empty() {
            (**full).clone()
        } else {
            self.hint.clone()
        }
    }

    /// Replace the full identifier once discovery has resolved it.
    pub fn update_full_identifier(&self, full: impl Into<String>) {
        self.full.store(Arc::new(full.into()));
    }

    /// True when `hint` is a substring of the full identifier and contains our hint.
    pub fn matches(&self, hint: &str) -> bool {
        self.full.load().contains(hint) && hint.contains(self.hint.as_str())
    }

    /// `"<hint> -> <full>"`, for diagnostics.
    pub fn relationship(&self) -> String {
        format!("{} -> {}", self.hint, self.full.load().as_str())
    }
}

impl PartialEq for FriendlyIdentifier {
    fn eq(&self, other: &Self) -> bool {
        *self.full.load() == *other.full.load()
    }
}

impl Eq for FriendlyIdentifier {}

impl fmt::Display for FriendlyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

/// Patterns are matched from the start of the identifier.
fn anchored_match(re: &Regex, text: &str) -> bool {
    re.find(text).is_some_and(|m| m.start() == 0)
}
