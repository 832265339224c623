//! Builders for the three subject patterns named in spec.md 4.10 / 6.

pub fn settlement_request(proposal_id: &str) -> String {
    format!("settlement.request.{proposal_id}")
}

pub fn settlement_status(proposal_id: &str) -> String {
    format!("settlement.status.{proposal_id}")
}

pub fn settlement_secret(proposal_id: &str) -> String {
    format!("settlement.secret.{proposal_id}")
}

/// Matches a concrete subject against a pattern that may end in `*`
/// (the only wildcard form the three subject families use).
pub fn matches(pattern: &str, subject: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => subject.starts_with(prefix),
        None => pattern == subject,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_pattern_matches_any_suffix() {
        assert!(matches("settlement.status.*", &settlement_status("p-1")));
        assert!(!matches("settlement.secret.*", &settlement_status("p-1")));
    }
}
