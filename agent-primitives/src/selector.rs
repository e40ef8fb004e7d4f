//! Selection of one remote tool out of a discovered catalog.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifies which discovered remote tool to invoke.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSelector {
    /// Match the tool whose declared name equals the value.
    Name(String),
    /// Take the tool at this zero-based position in discovery order.
    Index(usize),
}

impl ToolSelector {
    /// Selects a tool by its declared name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSelector`] if the name is blank.
    pub fn by_name(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidSelector {
                reason: "tool name cannot be empty".into(),
            });
        }
        Ok(Self::Name(name))
    }

    /// Selects a tool by discovery position.
    #[must_use]
    pub const fn by_index(index: usize) -> Self {
        Self::Index(index)
    }

    /// Returns the position of the matching entry in `names`, if any.
    pub fn position<'a, I>(&self, names: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self {
            Self::Name(wanted) => names.into_iter().position(|name| name == wanted),
            Self::Index(index) => {
                let count = names.into_iter().count();
                (*index < count).then_some(*index)
            }
        }
    }
}

impl Display for ToolSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "name {name:?}"),
            Self::Index(index) => write!(f, "index {index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: [&str; 3] = ["multiply", "add", "subtract"];

    #[test]
    fn name_selection_ignores_order() {
        let selector = ToolSelector::by_name("add").unwrap();
        assert_eq!(selector.position(NAMES), Some(1));
        assert_eq!(selector.position(["add"]), Some(0));
    }

    #[test]
    fn index_selection_is_bounds_checked() {
        assert_eq!(ToolSelector::by_index(2).position(NAMES), Some(2));
        assert_eq!(ToolSelector::by_index(3).position(NAMES), None);
        assert_eq!(ToolSelector::by_index(0).position(std::iter::empty()), None);
    }

    #[test]
    fn unknown_name_is_none() {
        let selector = ToolSelector::by_name("divide").unwrap();
        assert_eq!(selector.position(NAMES), None);
    }

    #[test]
    fn blank_names_rejected() {
        assert!(ToolSelector::by_name(" ").is_err());
    }

    #[test]
    fn display_is_descriptive() {
        assert_eq!(ToolSelector::by_name("add").unwrap().to_string(), "name \"add\"");
        assert_eq!(ToolSelector::by_index(0).to_string(), "index 0");
    }
}
