//! Hostname verification (spec §4.2.2 step 2)
//!
//! Matches the expected hostname against `subjectAltName:dNSName`
//! entries first, then the subject Common Name. Comparison is
//! case-insensitive ASCII; internationalised names are compared in
//! IDNA/ASCII (punycode) form. Wildcard rule: a leading `*.` matches
//! exactly one label.

/// Normalize a hostname to its ASCII (punycode) form for comparison.
/// Falls back to a lowercased copy of the input if IDNA conversion
/// fails (e.g. the input is already ASCII but not a valid domain).
fn to_ascii(host: &str) -> String {
    idna::domain_to_ascii(host).unwrap_or_else(|_| host.to_ascii_lowercase())
}

/// `*.A.B` matches `X.A.B` iff `X` contains no `.` (spec §4.2.2 / §8):
/// it does not match `A.B` (no extra label) or `Y.X.A.B` (more than one
/// extra label).
fn matches_pattern(pattern: &str, host: &str) -> bool {
    let pattern = to_ascii(pattern);
    let host = to_ascii(host);

    if let Some(rest) = pattern.strip_prefix("*.") {
        let Some((first_label, tail)) = host.split_once('.') else {
            return false;
        };
        !first_label.is_empty() && !first_label.contains('.') && tail == rest
    } else {
        pattern == host
    }
}

/// Match `host` against every `dNSName` SAN entry, falling back to the
/// subject Common Name if there are no SAN entries at all (legacy
/// servers; modern CAs always populate SAN).
#[must_use]
pub fn matches_any(dns_names: &[String], common_name: Option<&str>, host: &str) -> bool {
    if !dns_names.is_empty() {
        return dns_names.iter().any(|n| matches_pattern(n, host));
    }
    common_name.is_some_and(|cn| matches_pattern(cn, host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches_any(&["mail.example.com".into()], None, "mail.example.com"));
    }

    #[test]
    fn wildcard_matches_single_label() {
        assert!(matches_any(&["*.example.com".into()], None, "foo.example.com"));
    }

    #[test]
    fn wildcard_does_not_match_bare_domain() {
        assert!(!matches_any(&["*.example.com".into()], None, "example.com"));
    }

    #[test]
    fn wildcard_does_not_match_two_labels_deep() {
        assert!(!matches_any(&["*.example.com".into()], None, "a.b.example.com"));
    }

    #[test]
    fn case_insensitive() {
        assert!(matches_any(&["MAIL.Example.COM".into()], None, "mail.example.com"));
    }

    #[test]
    fn falls_back_to_common_name_without_san() {
        assert!(matches_any(&[], Some("mail.example.net"), "mail.example.net"));
        assert!(!matches_any(&[], Some("mail.example.net"), "mail.example.com"));
    }

    #[test]
    fn san_present_ignores_common_name() {
        assert!(!matches_any(
            &["other.example.com".into()],
            Some("mail.example.com"),
            "mail.example.com"
        ));
    }
}
