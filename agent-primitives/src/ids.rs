//! Invocation identifier types.

use std::fmt::{self, Display, Formatter};

use uuid::Uuid;

/// Correlates the log output of a single tool invocation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generates a random invocation identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for InvocationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_differ() {
        assert_ne!(InvocationId::random(), InvocationId::random());
    }

    #[test]
    fn displays_as_hyphenated_uuid() {
        let rendered = InvocationId::random().to_string();
        assert_eq!(rendered.len(), 36);
        assert_eq!(rendered.matches('-').count(), 4);
    }
}
