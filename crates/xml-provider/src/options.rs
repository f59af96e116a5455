use serde::{Deserialize, Serialize};

/// Behavior switches shared by a root adapter and the handles below it.
///
/// Handles inherit the options of their parent unless a builder overrides
/// them. Missing fields deserialize to their defaults, so binding layers can
/// keep partial settings in JSON or TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandleOptions {
    /// Report only add/remove of immediate children and attributes as
    /// `DescendantChanged`, suppressing deeper structural changes.
    pub discriminate_descendants: bool,
    /// Let attribute writes materialize a missing parent element.
    pub create_parent_if_missing: bool,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            discriminate_descendants: true,
            create_parent_if_missing: false,
        }
    }
}

impl HandleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_discriminate_descendants(mut self, enabled: bool) -> Self {
        self.discriminate_descendants = enabled;
        self
    }

    pub fn with_create_parent_if_missing(mut self, enabled: bool) -> Self {
        self.create_parent_if_missing = enabled;
        self
    }
}
