//! Hostname canonicalization.
//!
//! Every hostname entering the store goes through [`normalize_host`]. The function
//! never fails: values that do not look like an FQDN are still returned (trimmed and
//! lower-cased) and callers decide what to do with them via [`is_valid_hostname`].

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{VaultError, VaultResult};

/// DNS limit on the full textual name.
pub const MAX_HOSTNAME_LEN: usize = 253;

fn fqdn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?)*\.?$")
            .expect("static FQDN pattern compiles")
    })
}

/// Trim and lower-case a raw hostname.
///
/// Returns `""` for blank input. Over-long or oddly shaped names are returned in
/// their trimmed/lower-cased form unchanged. Idempotent.
pub fn normalize_host(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Basic FQDN shape check on an already normalized hostname.
pub fn is_valid_hostname(host: &str) -> bool {
    !host.is_empty() && host.len() <= MAX_HOSTNAME_LEN && fqdn_pattern().is_match(host)
}

/// Normalize a root domain that will be used to name store files.
///
/// Unlike [`normalize_host`] this rejects values that would escape the store
/// directory or produce hidden files.
pub fn normalize_domain(raw: &str) -> VaultResult<String> {
    let domain = normalize_host(raw);
    let domain = domain.trim_end_matches('.').to_string();

    if domain.is_empty() {
        return Err(VaultError::InvalidDomain("empty domain".to_string()));
    }
    if domain.starts_with('.') || domain.contains(['/', '\\', '\0']) {
        return Err(VaultError::InvalidDomain(domain));
    }
    Ok(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_lowercases() {
        assert_eq!(normalize_host("  WWW.Example.COM "), "www.example.com");
    }

    #[test]
    fn test_empty_stays_empty() {
        assert_eq!(normalize_host(""), "");
        assert_eq!(normalize_host("   \t"), "");
    }

    #[test]
    fn test_invalid_shape_is_kept() {
        let weird = normalize_host(" Under_Score.Example.com ");
        assert_eq!(weird, "under_score.example.com");
        assert!(!is_valid_hostname(&weird));
    }

    #[test]
    fn test_overlong_is_kept() {
        let long = format!("{}.com", "a".repeat(260));
        let normalized = normalize_host(&long.to_uppercase());
        assert_eq!(normalized, long);
        assert!(!is_valid_hostname(&normalized));
    }

    #[test]
    fn test_idempotent() {
        let once = normalize_host("  Mail.EXAMPLE.org.");
        assert_eq!(normalize_host(&once), once);
        assert!(is_valid_hostname(&once));
    }

    #[test]
    fn test_label_rules() {
        assert!(is_valid_hostname("a-b.example.com"));
        assert!(!is_valid_hostname("-ab.example.com"));
        assert!(!is_valid_hostname("ab-.example.com"));
        assert!(!is_valid_hostname(&format!("{}.com", "x".repeat(64))));
    }

    #[test]
    fn test_normalize_domain_rejects_paths() {
        assert_eq!(normalize_domain(" Example.COM. ").unwrap(), "example.com");
        assert!(normalize_domain("").is_err());
        assert!(normalize_domain("../etc").is_err());
        assert!(normalize_domain("a/b.com").is_err());
        assert!(normalize_domain(".hidden").is_err());
    }
}
