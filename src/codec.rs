//! The build token: a fixed-width, branch-aware build identifier.
//!
//! | Characters | Field | Example |
//! |---|---|---|
//! | 0–1 | major version, zero-padded | `01` |
//! | 2 | [`BranchCode`] | `D` |
//! | 3–6 | per-branch sequence, zero-padded | `0001` |
//! | 7 | [`BuildType`] suffix | `d` |
//!
//! So the first developer build of `1.x` on `dev` is `01D0001d`.

use crate::{
    branch::{classify, BranchCode},
    build_type::{detect, BuildType, ExecutionContext},
    counter::CounterPersistence,
    error::{CodecError, Error},
    state::VersionState,
    version::Date,
};
use chrono::Utc;
use core::fmt::{self, Display};
use tracing::{debug, info};

pub const MAX_MAJOR: u32 = 99;
pub const MAX_SEQUENCE: u32 = 9999;
const MIN_TOKEN_LEN: usize = 7;
const UNKNOWN: &str = "Unknown";

/// An encoded build token. Only [`encode`] creates one, so it always has the documented layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildToken(String);

impl BuildToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BuildToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Formats the parts of a build token.
///
/// # Errors
///
/// Returns [`CodecError::Overflow`] if `major` is above 99 or `sequence` above 9999. These would
/// widen their field and shift the branch code out of place, so they are refused rather than
/// wrapped or truncated.
///
/// ```
/// use verstamp::{encode, BranchCode, BuildType};
///
/// let token = encode(1, BranchCode::Dev, 1, BuildType::Developer).unwrap();
/// assert_eq!("01D0001d", token.as_str());
/// ```
pub fn encode(
    major: u32,
    branch: BranchCode,
    sequence: u32,
    build_type: BuildType,
) -> Result<BuildToken, CodecError> {
    if major > MAX_MAJOR {
        return Err(CodecError::Overflow {
            field: "major version",
            value: major,
            max: MAX_MAJOR,
        });
    }
    if sequence > MAX_SEQUENCE {
        return Err(CodecError::Overflow {
            field: "sequence",
            value: sequence,
            max: MAX_SEQUENCE,
        });
    }

    Ok(BuildToken(format!(
        "{major:02}{}{sequence:04}{}",
        branch.as_char(),
        build_type.suffix()
    )))
}

/// The fields of a decoded build token.
///
/// The raw characters are kept as they appeared so that tokens with codes this version does
/// not know about still decode; `branch_name` and `build_type_name` are then `"Unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildComponents {
    pub major: u32,
    pub branch_code: char,
    pub sequence: u32,
    /// `None` for 7-character tokens, which carry no build type.
    pub suffix: Option<char>,
    pub branch_name: &'static str,
    pub build_type_name: &'static str,
}

impl BuildComponents {
    pub fn branch(&self) -> Option<BranchCode> {
        BranchCode::from_char(self.branch_code)
    }

    pub fn build_type(&self) -> Option<BuildType> {
        self.suffix.and_then(BuildType::from_suffix)
    }
}

fn parse_digits(token: &str, digits: &[char], field: &'static str) -> Result<u32, CodecError> {
    if !digits.iter().all(char::is_ascii_digit) {
        return Err(CodecError::InvalidNumber {
            token: token.to_owned(),
            field,
        });
    }
    Ok(digits
        .iter()
        .fold(0, |acc, c| acc * 10 + c.to_digit(10).unwrap_or(0)))
}

/// Splits a build token back into its fields.
///
/// Characters past the eighth are ignored.
///
/// # Errors
///
/// - [`CodecError::TooShort`] if the token has fewer than 7 characters.
/// - [`CodecError::InvalidNumber`] if the major or sequence field is not all digits.
///
/// An unrecognized branch code or suffix is *not* an error.
///
/// ```
/// use verstamp::decode;
///
/// let parts = decode("01D0001d").unwrap();
/// assert_eq!(1, parts.major);
/// assert_eq!('D', parts.branch_code);
/// assert_eq!(1, parts.sequence);
/// assert_eq!("dev (development)", parts.branch_name);
/// ```
pub fn decode(token: &str) -> Result<BuildComponents, CodecError> {
    let token = token.trim();
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < MIN_TOKEN_LEN {
        return Err(CodecError::TooShort {
            token: token.to_owned(),
            len: chars.len(),
        });
    }

    let major = parse_digits(token, &chars[0..2], "major version")?;
    let branch_code = chars[2];
    let sequence = parse_digits(token, &chars[3..7], "sequence")?;
    let suffix = chars.get(7).copied();

    Ok(BuildComponents {
        major,
        branch_code,
        sequence,
        suffix,
        branch_name: BranchCode::from_char(branch_code)
            .map(|code| code.description())
            .unwrap_or(UNKNOWN),
        build_type_name: suffix
            .and_then(BuildType::from_suffix)
            .map(|t| t.name())
            .unwrap_or(UNKNOWN),
    })
}

/// Generates the next build token for `branch_name` and records it in `state`.
///
/// The branch is classified, the build type detected from `ctx` (unless `build_type` overrides
/// it), and the branch's counter advanced under the store's lock. The token is encoded before
/// the store is saved, so an overflowing token leaves the counters untouched.
///
/// If the process dies before the store is saved, running again hands out the same number. Once
/// saved, every call hands out a new one; this is not idempotent.
///
/// # Errors
///
/// - [`CodecError::Overflow`] if the major version or the branch's sequence no longer fits.
/// - A [`StoreError`](crate::StoreError) if the counter store cannot be locked or saved.
pub fn generate_build_number<P: CounterPersistence>(
    state: &mut VersionState,
    branch_name: &str,
    ctx: &ExecutionContext,
    build_type: Option<BuildType>,
    counters: &P,
    today: Date,
) -> Result<BuildToken, Error> {
    let code = classify(branch_name);
    let build_type = build_type.unwrap_or_else(|| detect(ctx));
    let major = state.version.major;
    debug!(branch = branch_name, %code, %build_type, major, "generating build number");

    let token = {
        let _guard = counters.lock()?;
        let (mut store, sequence) = counters.load().next_sequence(code, Utc::now())?;
        let token = encode(major, code, sequence, build_type)?;
        store.major_version = major;
        counters.save(&store)?;
        token
    };

    info!(%token, branch = branch_name, "generated build number");
    state.record_build(&token, branch_name, code, build_type, today);
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::{CounterStore, MemoryCounters};
    use itertools::iproduct;
    use proptest::prelude::*;
    use rstest::rstest;
    use std::collections::HashSet;

    fn today() -> Date {
        Date::explicit(2024, 3, 1).unwrap()
    }

    #[rstest]
    #[case(1, BranchCode::Dev, 1, BuildType::Developer, "01D0001d")]
    #[case(1, BranchCode::Release, 421, BuildType::Release, "01R0421r")]
    #[case(0, BranchCode::Unrecognized, 0, BuildType::Local, "00U0000l")]
    #[case(99, BranchCode::Feature, 9999, BuildType::Ci, "99F9999c")]
    #[case(12, BranchCode::ReleaseCandidate, 30, BuildType::Beta, "12C0030b")]
    fn test_encode(
        #[case] major: u32,
        #[case] branch: BranchCode,
        #[case] sequence: u32,
        #[case] build_type: BuildType,
        #[case] expected: &str,
    ) {
        assert_eq!(expected, encode(major, branch, sequence, build_type).unwrap().as_str());
    }

    #[rstest]
    #[case(100, 1, "major version")]
    #[case(1, 10000, "sequence")]
    fn test_encode_overflow(#[case] major: u32, #[case] sequence: u32, #[case] field: &str) {
        let result = encode(major, BranchCode::Dev, sequence, BuildType::Local);
        assert!(matches!(result, Err(CodecError::Overflow { field: f, .. }) if f == field));
    }

    #[test]
    fn test_decode_scenario() {
        let parts = decode("01D0001d").unwrap();
        assert_eq!(
            BuildComponents {
                major: 1,
                branch_code: 'D',
                sequence: 1,
                suffix: Some('d'),
                branch_name: "dev (development)",
                build_type_name: "developer",
            },
            parts
        );
        assert_eq!(Some(BranchCode::Dev), parts.branch());
        assert_eq!(Some(BuildType::Developer), parts.build_type());
    }

    #[test]
    fn test_decode_without_suffix() {
        let parts = decode("03H0012").unwrap();
        assert_eq!(3, parts.major);
        assert_eq!(None, parts.suffix);
        assert_eq!("hotfix", parts.branch_name);
        assert_eq!("Unknown", parts.build_type_name);
    }

    #[test]
    fn test_decode_unknown_codes() {
        let parts = decode("05Z0007q").unwrap();
        assert_eq!('Z', parts.branch_code);
        assert_eq!("Unknown", parts.branch_name);
        assert_eq!("Unknown", parts.build_type_name);
        assert_eq!(None, parts.branch());
    }

    #[rstest]
    #[case("", 0)]
    #[case("01D001", 6)]
    #[case("01", 2)]
    fn test_decode_too_short(#[case] token: &str, #[case] len: usize) {
        assert_eq!(
            Err(CodecError::TooShort {
                token: token.to_owned(),
                len
            }),
            decode(token)
        );
    }

    #[rstest]
    #[case("0xD0001d", "major version")]
    #[case("01D00a1d", "sequence")]
    fn test_decode_invalid_number(#[case] token: &str, #[case] field: &str) {
        assert!(matches!(decode(token), Err(CodecError::InvalidNumber { field: f, .. }) if f == field));
    }

    #[test]
    fn test_tokens_do_not_collide_across_branches_and_types() {
        let tokens: HashSet<String> = iproduct!(BranchCode::ALL, BuildType::ALL, [1u32, 10, 100])
            .map(|(code, build_type, seq)| encode(2, code, seq, build_type).unwrap().to_string())
            .collect();
        assert_eq!(BranchCode::ALL.len() * BuildType::ALL.len() * 3, tokens.len());
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            major in 0u32..=99,
            code_idx in 0usize..BranchCode::ALL.len(),
            sequence in 0u32..=9999,
            type_idx in 0usize..BuildType::ALL.len(),
        ) {
            let code = BranchCode::ALL[code_idx];
            let build_type = BuildType::ALL[type_idx];
            let token = encode(major, code, sequence, build_type).unwrap();
            let parts = decode(token.as_str()).unwrap();
            prop_assert_eq!(major, parts.major);
            prop_assert_eq!(Some(code), parts.branch());
            prop_assert_eq!(sequence, parts.sequence);
            prop_assert_eq!(Some(build_type), parts.build_type());
        }
    }

    #[test]
    fn test_generate_first_dev_build() {
        let mut state = VersionState::default();
        state.version.major = 1;
        let ctx = ExecutionContext::new(true, "refs/heads/dev");
        let counters = MemoryCounters::default();

        let token =
            generate_build_number(&mut state, "dev", &ctx, None, &counters, today()).unwrap();

        assert_eq!("01D0001d", token.as_str());
        assert_eq!(Some("01D0001d"), state.build.token.as_deref());
        assert_eq!(Some("2024-03-01"), state.build.date.as_deref());
        assert_eq!(Some(BuildType::Developer), state.build.build_type);
        assert_eq!(Some(BranchCode::Dev), state.build.branch_code);
        let saved = counters.saved().unwrap();
        assert_eq!(1, saved.counter(BranchCode::Dev));
        assert_eq!(1, saved.total_builds);
    }

    #[test]
    fn test_generate_override_and_sequence() {
        let mut state = VersionState::default();
        state.version.major = 2;
        let ctx = ExecutionContext::new(false, "");
        let counters = MemoryCounters::default();

        let first =
            generate_build_number(&mut state, "feature/a", &ctx, None, &counters, today()).unwrap();
        let nightly = Some(BuildType::Nightly);
        let second =
            generate_build_number(&mut state, "feature/b", &ctx, nightly, &counters, today()).unwrap();

        assert_eq!("02F0001l", first.as_str());
        assert_eq!("02F0002n", second.as_str());
    }

    #[test]
    fn test_generate_overflow_keeps_counters() {
        let mut state = VersionState::default();
        state.version.major = 1;
        let mut store = CounterStore::default();
        store.branch_counters.insert(BranchCode::Dev, 9999);
        store.total_builds = 9999;
        let counters = MemoryCounters::new(store.clone());
        let ctx = ExecutionContext::new(false, "");

        let result = generate_build_number(&mut state, "dev", &ctx, None, &counters, today());

        assert!(matches!(result, Err(Error::Codec(CodecError::Overflow { .. }))));
        assert_eq!(Some(store), counters.saved());
        assert_eq!(None, state.build.token);
    }
}
