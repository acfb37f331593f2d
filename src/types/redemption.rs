//! Redemption Types

use serde::{Deserialize, Serialize};

/// Entry reported when markers could not be checked
pub const MARKER_CHECK_UNAVAILABLE: &str = "marker-check-unavailable";

/// Outcome of the marker-safety check for one redemption attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerCheckResult {
    pub should_warn: bool,
    pub offending_unit_ids: Vec<String>,
}

impl MarkerCheckResult {
    /// No marked units among those checked
    pub fn clear() -> Self {
        Self::default()
    }

    /// Units carrying at least one marker
    pub fn offending(unit_ids: Vec<String>) -> Self {
        Self {
            should_warn: !unit_ids.is_empty(),
            offending_unit_ids: unit_ids,
        }
    }

    /// The check itself failed; warn rather than proceed silently
    pub fn unavailable() -> Self {
        Self {
            should_warn: true,
            offending_unit_ids: vec![MARKER_CHECK_UNAVAILABLE.to_string()],
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.offending_unit_ids
            .iter()
            .any(|id| id == MARKER_CHECK_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_results() {
        assert!(!MarkerCheckResult::clear().should_warn);
        assert!(!MarkerCheckResult::offending(vec![]).should_warn);

        let marked = MarkerCheckResult::offending(vec!["17".to_string()]);
        assert!(marked.should_warn);
        assert!(!marked.is_unavailable());

        let failed = MarkerCheckResult::unavailable();
        assert!(failed.should_warn);
        assert!(failed.is_unavailable());
    }
}
