//! Configuration text normalization
//!
//! Pure, deterministic transform from raw retrieved text to the form that
//! gets committed: volatile lines (timestamps, checksums, session banners)
//! are dropped per platform so an unchanged device produces a byte-identical
//! snapshot, and therefore no new commit.
//!
//! The rule tables below are deliberately small; platforms without a table
//! get the identity transform rather than a failed backup.

use sha2::{Digest, Sha256};

/// One line filter. A line matching any rule for its platform is dropped.
#[derive(Debug, Clone, Copy)]
pub enum LineRule {
    /// Line starts with this text (after trailing-CR stripping).
    Prefix(&'static str),
    /// Line contains this text anywhere.
    Contains(&'static str),
}

impl LineRule {
    fn matches(&self, line: &str) -> bool {
        match self {
            LineRule::Prefix(p) => line.starts_with(p),
            LineRule::Contains(c) => line.contains(c),
        }
    }
}

/// Lines that change on every read of an IOS running-config without any
/// configuration change.
const CISCO_IOS_RULES: &[LineRule] = &[
    LineRule::Prefix("Building configuration"),
    LineRule::Prefix("Current configuration"),
    LineRule::Contains("Last configuration change"),
    LineRule::Contains("NVRAM config last updated"),
    LineRule::Prefix("ntp clock-period"),
    LineRule::Prefix("! No configuration change since last restart"),
];

/// ASA prints `: <metadata>` header lines and a trailing checksum that
/// differ between otherwise identical reads.
const CISCO_ASA_RULES: &[LineRule] = &[
    LineRule::Prefix(": "),
    LineRule::Contains("Cryptochecksum:"),
];

const JUNOS_RULES: &[LineRule] = &[
    LineRule::Prefix("## Last commit:"),
    LineRule::Prefix("## Last changed:"),
    LineRule::Prefix("# Generated"),
];

/// Rule table for a platform tag. Unknown tags get no rules (identity).
pub fn rules_for(platform_tag: &str) -> &'static [LineRule] {
    match platform_tag {
        "cisco_ios" => CISCO_IOS_RULES,
        "cisco_asa" => CISCO_ASA_RULES,
        "junos" => JUNOS_RULES,
        _ => &[],
    }
}

/// Normalize raw configuration text for the given platform tag.
///
/// Strips CR line endings, drops lines matching the platform's rules, and
/// guarantees at most one trailing newline (exactly one whenever any line
/// survives) so hashes are stable.
pub fn normalize(platform_tag: &str, raw: &str) -> String {
    let rules = rules_for(platform_tag);

    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if rules.iter().any(|r| r.matches(line)) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }

    while out.ends_with("\n\n") {
        out.pop();
    }

    out
}

/// SHA-256 fingerprint of normalized text, hex-encoded. Used to detect
/// unchanged devices across runs.
pub fn content_hash(normalized: &str) -> String {
    let digest = Sha256::digest(normalized.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ios_volatile_lines_are_dropped() {
        let raw = "Building configuration...\n\
                   Current configuration : 1337 bytes\n\
                   ! Last configuration change at 10:11:12 UTC Mon Jan 1 2024\n\
                   hostname r1\n\
                   ntp clock-period 17208943\n\
                   interface Gi0/0\n";
        let normalized = normalize("cisco_ios", raw);
        assert_eq!(normalized, "hostname r1\ninterface Gi0/0\n");
    }

    #[test]
    fn asa_header_and_checksum_are_dropped() {
        let raw = ": Saved\n\
                   : Written by admin at 10:11:12\n\
                   ASA Version 9.12(4)\n\
                   hostname fw1\n\
                   Cryptochecksum:deadbeefdeadbeefdeadbeefdeadbeef\n";
        let normalized = normalize("cisco_asa", raw);
        assert_eq!(normalized, "ASA Version 9.12(4)\nhostname fw1\n");
    }

    #[test]
    fn junos_commit_banner_is_dropped() {
        let raw = "## Last commit: 2024-01-01 10:11:12 UTC by backup\n\
                   set system host-name r2\n";
        let normalized = normalize("junos", raw);
        assert_eq!(normalized, "set system host-name r2\n");
    }

    #[test]
    fn unknown_platform_is_identity() {
        let raw = "anything at all\n: even asa-looking lines\n";
        assert_eq!(normalize("frobnitz_os", raw), raw);
    }

    #[test]
    fn normalization_is_deterministic() {
        let raw = "hostname r1\r\n! Last configuration change at now\r\ninterface Gi0/0\r\n";
        let first = normalize("cisco_ios", raw);
        let second = normalize("cisco_ios", raw);
        assert_eq!(first, second);
        assert_eq!(first, "hostname r1\ninterface Gi0/0\n");
    }

    #[test]
    fn trailing_newline_is_exactly_one() {
        assert_eq!(normalize("junos", "set a\n\n\n"), "set a\n");
        assert_eq!(normalize("junos", "set a"), "set a\n");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize("junos", ""), "");
        assert_eq!(normalize("cisco_ios", "Building configuration...\n"), "");
    }

    #[test]
    fn identical_content_hashes_identically() {
        let a = content_hash("hostname r1\n");
        let b = content_hash("hostname r1\n");
        let c = content_hash("hostname r2\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
