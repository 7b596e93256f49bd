//! Target-label match evaluation.

use crate::provider::Message;

/// Returns whether `message` should be persisted.
///
/// No target label (or an empty one) accepts everything. Otherwise the label
/// must appear in `label_ids` exactly; comparison is case-sensitive.
pub fn matches(message: &Message, target_label: Option<&str>) -> bool {
    match target_label {
        None | Some("") => true,
        Some(label) => message.label_ids.iter().any(|l| l == label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(labels: &[&str]) -> Message {
        Message {
            id: "m".to_string(),
            label_ids: labels.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_target_accepts_all() {
        assert!(matches(&message(&[]), None));
        assert!(matches(&message(&["INBOX"]), Some("")));
    }

    #[test]
    fn test_exact_membership() {
        let msg = message(&["INBOX", "Label_7"]);
        assert!(matches(&msg, Some("Label_7")));
        assert!(!matches(&msg, Some("Label_8")));
    }

    #[test]
    fn test_case_sensitive() {
        let msg = message(&["Invoices"]);
        assert!(!matches(&msg, Some("invoices")));
        assert!(!matches(&msg, Some("Invoice")));
    }
}
