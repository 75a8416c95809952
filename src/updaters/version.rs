// Loose version parsing and comparison shared by all updaters

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

lazy_static::lazy_static! {
    static ref NUMERIC_RUN: Regex = Regex::new(r"\d+(?:\.\d+)*").expect("valid version regex");
}

/// Dotted numeric version extracted from free-form text. Trailing zero
/// components do not matter when comparing, so `1.2` equals `1.2.0`.
#[derive(Debug, Clone)]
pub struct LooseVersion(Vec<u64>);

impl LooseVersion {
    pub fn components(&self) -> &[u64] {
        &self.0
    }

    fn trimmed(&self) -> &[u64] {
        let end = self
            .0
            .iter()
            .rposition(|part| *part != 0)
            .map_or(0, |i| i + 1);
        &self.0[..end]
    }
}

impl PartialEq for LooseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.trimmed() == other.trimmed()
    }
}

impl Eq for LooseVersion {}

impl PartialOrd for LooseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LooseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.trimmed().cmp(other.trimmed())
    }
}

impl fmt::Display for LooseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Take the first numeric run of `text` (`v2.1.0-beta` -> `2.1.0`).
/// Text without any digit parses as `1.0`.
pub fn parse_version(text: &str) -> LooseVersion {
    let parsed = NUMERIC_RUN.find(text).and_then(|m| {
        m.as_str()
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<u64>>>()
    });
    LooseVersion(parsed.unwrap_or_else(|| vec![1, 0]))
}

/// How a local value is compared against a remote one. The comparison answers
/// "is the remote newer?", so `Lt` means `local < remote`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompareOp {
    #[default]
    Lt,
    Le,
    Ne,
}

/// True when `remote` should replace `local`. A missing local version always
/// loses. `skip_check` forces a positive answer.
pub fn has_new_version(local: Option<&str>, remote: &str, op: CompareOp, skip_check: bool) -> bool {
    if skip_check {
        return true;
    }
    let Some(local) = local.filter(|v| !v.trim().is_empty()) else {
        return true;
    };
    let (local, remote) = (parse_version(local), parse_version(remote));
    match op {
        CompareOp::Lt => local < remote,
        CompareOp::Le => local <= remote,
        CompareOp::Ne => local != remote,
    }
}

/// Inequality check for opaque identifiers such as hashes and commit SHAs
pub fn is_different(local: Option<&str>, remote: &str, skip_check: bool) -> bool {
    if skip_check {
        return true;
    }
    match local {
        Some(local) => !local.trim().eq_ignore_ascii_case(remote.trim()),
        None => true,
    }
}

/// Build numbers compare as integers, an unknown local build is always older
pub fn has_newer_build(local: Option<i64>, remote: i64, skip_check: bool) -> bool {
    skip_check || local.is_none_or(|local| local < remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_minor_version_wins() {
        assert!(has_new_version(Some("1.2.0"), "1.3.0", CompareOp::Lt, false));
        assert!(!has_new_version(Some("1.3.0"), "1.2.0", CompareOp::Lt, false));
    }

    #[test]
    fn test_equal_versions_are_not_newer() {
        assert!(!has_new_version(Some("1.2.0"), "1.2.0", CompareOp::Lt, false));
        assert!(!has_new_version(Some("1.2"), "1.2.0", CompareOp::Lt, false));
        assert!(has_new_version(Some("1.2.0"), "1.2.0", CompareOp::Le, false));
    }

    #[test]
    fn test_parse_takes_first_numeric_run() {
        assert_eq!(parse_version("v2.1.0-beta").components(), &[2, 1, 0]);
        assert_eq!(parse_version("EssentialsX 2.20.1 build 5").components(), &[2, 20, 1]);
        assert!(parse_version("1.10") > parse_version("1.9"));
    }

    #[test]
    fn test_parse_falls_back_to_one_zero() {
        assert_eq!(parse_version("latest").to_string(), "1.0");
        assert_eq!(parse_version(""), parse_version("1"));
    }

    #[test]
    fn test_skip_check_forces_update() {
        assert!(has_new_version(Some("9.9"), "1.0", CompareOp::Lt, true));
        assert!(is_different(Some("abc"), "abc", true));
        assert!(has_newer_build(Some(10), 3, true));
    }

    #[test]
    fn test_missing_local_version_is_older() {
        assert!(has_new_version(None, "1.0", CompareOp::Lt, false));
        assert!(has_new_version(Some(" "), "1.0", CompareOp::Lt, false));
    }

    #[test]
    fn test_hash_difference() {
        let hash = "5d41402abc4b2a76b9719d911017c592";
        assert!(!is_different(Some(hash), hash, false));
        assert!(is_different(Some(hash), "7d793037a0760186574b0282f2f435e7", false));
        assert!(is_different(None, hash, false));
    }

    #[test]
    fn test_build_numbers() {
        assert!(has_newer_build(Some(100), 101, false));
        assert!(!has_newer_build(Some(101), 101, false));
        assert!(has_newer_build(None, 1, false));
    }
}
