//! Graph label sanitization.
//!
//! A holon's type becomes a node label only when it consists entirely of
//! ASCII letters, digits, and underscores. Anything else is still stored in
//! the node's `type` property but never used to build a label, so a
//! free-text type cannot smuggle query syntax into a backend.

/// Maximum label length accepted.
const MAX_LABEL_LEN: usize = 64;

/// Whether `name` may be used verbatim as a graph label.
pub fn is_safe_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_LABEL_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// The label for a holon type name, or `None` when it is not safe.
pub fn label_for(type_name: &str) -> Option<String> {
    is_safe_label(type_name).then(|| type_name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_type_names_are_labels() {
        for name in ["Organization", "Team", "Working_Group_2"] {
            assert_eq!(label_for(name).as_deref(), Some(name));
        }
    }

    #[test]
    fn unsafe_names_are_rejected() {
        for name in [
            "",
            "Working Group",
            "Team`) DETACH DELETE n //",
            "Équipe",
            "a-b",
        ] {
            assert!(label_for(name).is_none(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn overlong_names_are_rejected() {
        assert!(!is_safe_label(&"A".repeat(MAX_LABEL_LEN + 1)));
        assert!(is_safe_label(&"A".repeat(MAX_LABEL_LEN)));
    }
}
