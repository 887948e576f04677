//! Read-side filters for holon and relationship queries.
//!
//! Property constraints are exact JSON equality on top-level keys; an
//! absent key never matches.

use holon_types::{AuthorityLevel, Holon, HolonStatus, PropertyMap, Relationship};
use serde::{Deserialize, Serialize};

/// Constraints on holons returned by a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolonFilter {
    /// Only holons with this status.
    pub status: Option<HolonStatus>,
    /// Required property values.
    #[serde(default)]
    pub properties: PropertyMap,
}

impl HolonFilter {
    /// Only active holons.
    pub fn active() -> Self {
        Self {
            status: Some(HolonStatus::Active),
            ..Self::default()
        }
    }

    /// Require `key` to equal `value`.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        self.properties.insert(key.to_owned(), value);
        self
    }

    /// Whether `holon` satisfies every constraint.
    pub fn matches(&self, holon: &Holon) -> bool {
        self.status.is_none_or(|status| holon.status == status)
            && properties_match(&self.properties, &holon.properties)
    }
}

/// Constraints on relationships returned by a traversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipFilter {
    /// Skip relationships that have ended.
    #[serde(default)]
    pub in_force_only: bool,
    /// Only relationships with this provenance.
    pub authority_level: Option<AuthorityLevel>,
    /// Required property values.
    #[serde(default)]
    pub properties: PropertyMap,
}

impl RelationshipFilter {
    /// Only relationships still in force.
    pub fn in_force() -> Self {
        Self {
            in_force_only: true,
            ..Self::default()
        }
    }

    /// Whether `relationship` satisfies every constraint.
    pub fn matches(&self, relationship: &Relationship) -> bool {
        (!self.in_force_only || relationship.is_in_force())
            && self
                .authority_level
                .is_none_or(|level| relationship.authority_level == level)
            && properties_match(&self.properties, &relationship.properties)
    }
}

fn properties_match(required: &PropertyMap, actual: &PropertyMap) -> bool {
    required
        .iter()
        .all(|(key, value)| actual.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use holon_types::{EventId, HolonType};
    use serde_json::json;

    use super::*;

    fn holon(status: HolonStatus) -> Holon {
        Holon {
            id: "team-1".into(),
            holon_type: HolonType::Team,
            properties: [("name".to_owned(), json!("Core"))].into_iter().collect(),
            status,
            created_at: Utc::now(),
            created_by: EventId::new(),
            source_documents: Vec::new(),
        }
    }

    #[test]
    fn default_filter_matches_everything() {
        assert!(HolonFilter::default().matches(&holon(HolonStatus::Inactive)));
    }

    #[test]
    fn status_and_properties_are_conjunctive() {
        let filter = HolonFilter::active().with_property("name", json!("Core"));
        assert!(filter.matches(&holon(HolonStatus::Active)));
        assert!(!filter.matches(&holon(HolonStatus::Inactive)));

        let other = HolonFilter::default().with_property("name", json!("Edge"));
        assert!(!other.matches(&holon(HolonStatus::Active)));

        let missing = HolonFilter::default().with_property("budget", json!(10));
        assert!(!missing.matches(&holon(HolonStatus::Active)));
    }
}
