use core::fmt::{self, Display};
use serde::{Deserialize, Serialize};

/// A single-character classification of a source-control branch.
///
/// Only the counts per code are persisted (see [`CounterStore`](crate::CounterStore)); the code
/// itself is always derived again from a branch name with [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BranchCode {
    /// `main`
    #[serde(rename = "R")]
    Release,
    /// `dev`
    #[serde(rename = "D")]
    Dev,
    /// `hotfix/*`
    #[serde(rename = "H")]
    Hotfix,
    /// `alpha/*`
    #[serde(rename = "A")]
    Alpha,
    /// `beta/*`
    #[serde(rename = "B")]
    Beta,
    /// `rc/*`
    #[serde(rename = "C")]
    ReleaseCandidate,
    /// `feature/*`
    #[serde(rename = "F")]
    Feature,
    /// `bugfix/*`
    #[serde(rename = "X")]
    Bugfix,
    /// `pr`
    #[serde(rename = "P")]
    PullRequest,
    /// Anything else.
    #[serde(rename = "U")]
    Unrecognized,
}

impl BranchCode {
    /// Every code, in the order they are listed in reports.
    pub const ALL: [BranchCode; 10] = [
        BranchCode::Release,
        BranchCode::Dev,
        BranchCode::Hotfix,
        BranchCode::Alpha,
        BranchCode::Beta,
        BranchCode::ReleaseCandidate,
        BranchCode::Feature,
        BranchCode::Bugfix,
        BranchCode::PullRequest,
        BranchCode::Unrecognized,
    ];

    /// The character written into build tokens.
    pub fn as_char(&self) -> char {
        match self {
            BranchCode::Release => 'R',
            BranchCode::Dev => 'D',
            BranchCode::Hotfix => 'H',
            BranchCode::Alpha => 'A',
            BranchCode::Beta => 'B',
            BranchCode::ReleaseCandidate => 'C',
            BranchCode::Feature => 'F',
            BranchCode::Bugfix => 'X',
            BranchCode::PullRequest => 'P',
            BranchCode::Unrecognized => 'U',
        }
    }

    /// The inverse of [`BranchCode::as_char`]. Lowercase is not accepted: tokens are written
    /// uppercase.
    pub fn from_char(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_char() == c)
    }

    /// A human-readable description, used when decoding tokens.
    pub fn description(&self) -> &'static str {
        match self {
            BranchCode::Release => "main (release)",
            BranchCode::Dev => "dev (development)",
            BranchCode::Hotfix => "hotfix",
            BranchCode::Alpha => "alpha",
            BranchCode::Beta => "beta",
            BranchCode::ReleaseCandidate => "release candidate",
            BranchCode::Feature => "feature",
            BranchCode::Bugfix => "bugfix",
            BranchCode::PullRequest => "pull request",
            BranchCode::Unrecognized => "unrecognized",
        }
    }
}

impl Display for BranchCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

const EXACT: &[(&str, BranchCode)] = &[("main", BranchCode::Release), ("dev", BranchCode::Dev)];

// first match wins
const PREFIXES: &[(&str, BranchCode)] = &[
    ("hotfix/", BranchCode::Hotfix),
    ("alpha/", BranchCode::Alpha),
    ("beta/", BranchCode::Beta),
    ("rc/", BranchCode::ReleaseCandidate),
    ("feature/", BranchCode::Feature),
    ("bugfix/", BranchCode::Bugfix),
];

const PULL_REQUEST: &str = "pr";

/// Prefixes that say where a branch lives rather than what it is.
const LOCATION_PREFIXES: &[&str] = &["refs/heads/", "origin/"];

/// Maps a branch name to its [`BranchCode`].
///
/// Matching is case-insensitive. Exact names (`main`, `dev`) are checked before the prefixes
/// (`hotfix/`, `alpha/`, `beta/`, `rc/`, `feature/`, `bugfix/`), then the literal `pr`. Anything
/// else is [`BranchCode::Unrecognized`]; this never fails.
///
/// A leading `refs/heads/` or `origin/` is ignored, so `refs/heads/main` is [`BranchCode::Release`].
///
/// ```
/// use verstamp::{classify, BranchCode};
///
/// assert_eq!(classify("MAIN"), BranchCode::Release);
/// assert_eq!(classify("feature/login"), BranchCode::Feature);
/// assert_eq!(classify("wip"), BranchCode::Unrecognized);
/// ```
pub fn classify(branch_name: &str) -> BranchCode {
    let lowered = branch_name.trim().to_lowercase();
    let mut name = lowered.as_str();
    for prefix in LOCATION_PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest;
        }
    }

    if let Some((_, code)) = EXACT.iter().find(|(exact, _)| *exact == name) {
        return *code;
    }
    if let Some((_, code)) = PREFIXES.iter().find(|(prefix, _)| name.starts_with(prefix)) {
        return *code;
    }
    if name == PULL_REQUEST {
        return BranchCode::PullRequest;
    }
    BranchCode::Unrecognized
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("main", BranchCode::Release)]
    #[case("MAIN", BranchCode::Release)]
    #[case("Main", BranchCode::Release)]
    #[case("dev", BranchCode::Dev)]
    #[case("hotfix/crash-on-start", BranchCode::Hotfix)]
    #[case("alpha/1.0", BranchCode::Alpha)]
    #[case("Beta/2", BranchCode::Beta)]
    #[case("rc/3", BranchCode::ReleaseCandidate)]
    #[case("feature/login", BranchCode::Feature)]
    #[case("bugfix/typo", BranchCode::Bugfix)]
    #[case("pr", BranchCode::PullRequest)]
    #[case("refs/heads/main", BranchCode::Release)]
    #[case("origin/feature/x", BranchCode::Feature)]
    #[case("", BranchCode::Unrecognized)]
    #[case("mainline", BranchCode::Unrecognized)]
    #[case("develop", BranchCode::Unrecognized)]
    #[case("feature", BranchCode::Unrecognized)]
    #[case("pr/12", BranchCode::Unrecognized)]
    fn test_classify(#[case] name: &str, #[case] expected: BranchCode) {
        assert_eq!(expected, classify(name));
    }

    #[test]
    fn test_char_round_trip() {
        for code in BranchCode::ALL {
            assert_eq!(Some(code), BranchCode::from_char(code.as_char()));
        }
        assert_eq!(None, BranchCode::from_char('r'));
        assert_eq!(None, BranchCode::from_char('Z'));
    }

    #[test]
    fn test_codes_are_distinct() {
        let mut chars: Vec<char> = BranchCode::ALL.iter().map(BranchCode::as_char).collect();
        chars.sort_unstable();
        chars.dedup();
        assert_eq!(BranchCode::ALL.len(), chars.len());
    }

    #[test]
    fn test_serializes_as_char() {
        let json = serde_json::to_string(&BranchCode::Feature).unwrap();
        assert_eq!("\"F\"", json);
    }

    proptest! {
        #[test]
        fn classify_is_total_and_deterministic(name in ".*") {
            prop_assert_eq!(classify(&name), classify(&name));
        }

        #[test]
        fn classify_ignores_case(name in "[a-zA-Z/]{0,12}") {
            prop_assert_eq!(classify(&name.to_uppercase()), classify(&name.to_lowercase()));
        }
    }
}
