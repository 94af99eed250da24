//! The in-memory record of everything the definitions file holds.
//!
//! A [`VersionState`] is read from [`Definitions`], changed by the operations below, and written
//! back. Missing or malformed definitions fall back to the defaults listed on each field.

use crate::{
    branch::BranchCode,
    build_type::BuildType,
    codec::BuildToken,
    definitions::Definitions,
    vcs::{CommitInfo, UNKNOWN},
    version::{Date, PreRelease, SemLevel, VersionTriple},
};
use tracing::{debug, warn};

pub const PROJECT_NAME: &str = "PROJECT_NAME";
pub const PROJECT_AUTHOR: &str = "PROJECT_AUTHOR";
pub const PROJECT_VERSION: &str = "PROJECT_VERSION";
pub const PROJECT_VERSION_MAJOR: &str = "PROJECT_VERSION_MAJOR";
pub const PROJECT_VERSION_MINOR: &str = "PROJECT_VERSION_MINOR";
pub const PROJECT_VERSION_PATCH: &str = "PROJECT_VERSION_PATCH";
pub const PROJECT_VERSION_MAJOR_NUM: &str = "PROJECT_VERSION_MAJOR_NUM";
pub const PROJECT_VERSION_MINOR_NUM: &str = "PROJECT_VERSION_MINOR_NUM";
pub const PROJECT_VERSION_PATCH_NUM: &str = "PROJECT_VERSION_PATCH_NUM";
pub const PROJECT_VERSION_NUM: &str = "PROJECT_VERSION_NUM";
pub const PROJECT_VERSION_SUFFIX: &str = "PROJECT_VERSION_SUFFIX";
pub const PROJECT_VERSION_TAG: &str = "PROJECT_VERSION_TAG";
pub const PROJECT_BUILD: &str = "PROJECT_BUILD";
pub const PROJECT_BUILD_NUM: &str = "PROJECT_BUILD_NUM";
pub const PROJECT_BUILD_DATE: &str = "PROJECT_BUILD_DATE";
pub const PROJECT_BUILD_TOKEN: &str = "PROJECT_BUILD_TOKEN";
pub const PROJECT_BUILD_TYPE: &str = "PROJECT_BUILD_TYPE";
pub const PROJECT_BRANCH: &str = "PROJECT_BRANCH";
pub const PROJECT_BRANCH_CODE: &str = "PROJECT_BRANCH_CODE";
pub const PROJECT_BUILD_SUFFIX: &str = "PROJECT_BUILD_SUFFIX";
pub const PROJECT_COMMIT_HASH: &str = "PROJECT_COMMIT_HASH";
pub const PROJECT_COMMIT_SHORT: &str = "PROJECT_COMMIT_SHORT";
pub const PROJECT_COMMIT_AUTHOR: &str = "PROJECT_COMMIT_AUTHOR";
pub const PROJECT_COMMIT_DATE: &str = "PROJECT_COMMIT_DATE";

/// `(string form, numeric form)` definition names per level.
pub(crate) const COMPONENTS: [(SemLevel, &str, &str); 3] = [
    (SemLevel::Major, PROJECT_VERSION_MAJOR, PROJECT_VERSION_MAJOR_NUM),
    (SemLevel::Minor, PROJECT_VERSION_MINOR, PROJECT_VERSION_MINOR_NUM),
    (SemLevel::Patch, PROJECT_VERSION_PATCH, PROJECT_VERSION_PATCH_NUM),
];

const DEFAULT_NAME: &str = "Unnamed Project";
const DEFAULT_VERSION: VersionTriple = VersionTriple {
    major: 0,
    minor: 1,
    patch: 0,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    /// Default: `"Unnamed Project"`.
    pub name: String,
    /// Default: `"unknown"`.
    pub author: String,
}

/// What the last build-related command recorded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildInfo {
    /// The plain build counter. Default: `0`.
    pub counter: u64,
    /// `YYYY-MM-DD` of the last change. Default: none.
    pub date: Option<String>,
    /// The last generated build token, as written. Default: none.
    pub token: Option<String>,
    pub build_type: Option<BuildType>,
    pub branch: Option<String>,
    pub branch_code: Option<BranchCode>,
}

/// The version forms exactly as they were found in the file, before any defaulting. Only the
/// consistency check looks at these.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Recorded {
    pub version: Option<String>,
    /// String forms of major, minor and patch.
    pub components: [Option<String>; 3],
    /// Numeric forms of major, minor and patch.
    pub component_nums: [Option<i64>; 3],
    pub version_num: Option<i64>,
    pub suffix: Option<String>,
    pub tag: Option<String>,
}

/// A snapshot of the definitions file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionState {
    pub project: ProjectInfo,
    /// Default: from the component definitions, else `PROJECT_VERSION`, else `0.1.0`.
    pub version: VersionTriple,
    suffix: String,
    tag: String,
    pub build: BuildInfo,
    /// Default: [`CommitInfo::unknown`].
    pub commit: CommitInfo,
    recorded: Recorded,
}

impl Default for VersionState {
    fn default() -> Self {
        Self {
            project: ProjectInfo {
                name: DEFAULT_NAME.to_owned(),
                author: UNKNOWN.to_owned(),
            },
            version: DEFAULT_VERSION,
            suffix: String::new(),
            tag: String::new(),
            build: BuildInfo::default(),
            commit: CommitInfo::unknown(),
            recorded: Recorded::default(),
        }
    }
}

fn parse_component(text: &Option<String>, num: Option<i64>) -> Option<u32> {
    text.as_deref()
        .and_then(|t| t.trim().parse().ok())
        .or_else(|| num.and_then(|n| u32::try_from(n).ok()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl VersionState {
    pub fn from_definitions(defs: &Definitions) -> Self {
        let defaults = Self::default();

        let recorded = Recorded {
            version: defs.text(PROJECT_VERSION),
            components: COMPONENTS.map(|(_, text, _)| defs.text(text)),
            component_nums: COMPONENTS.map(|(_, _, num)| defs.number(num)),
            version_num: defs.number(PROJECT_VERSION_NUM),
            suffix: defs.text(PROJECT_VERSION_SUFFIX),
            tag: defs.text(PROJECT_VERSION_TAG),
        };

        let from_components = || {
            let [major, minor, patch] = [0, 1, 2]
                .map(|i| parse_component(&recorded.components[i], recorded.component_nums[i]));
            Some(VersionTriple::new(major?, minor?, patch?))
        };
        let version = from_components()
            .or_else(|| recorded.version.as_deref().and_then(VersionTriple::parse))
            .unwrap_or_else(|| {
                warn!("no usable version definitions, assuming {DEFAULT_VERSION}");
                DEFAULT_VERSION
            });

        let build = BuildInfo {
            counter: defs
                .number(PROJECT_BUILD)
                .or_else(|| defs.number(PROJECT_BUILD_NUM))
                .and_then(|n| u64::try_from(n).ok())
                .unwrap_or(0),
            date: non_empty(defs.text(PROJECT_BUILD_DATE)),
            token: non_empty(defs.text(PROJECT_BUILD_TOKEN)),
            build_type: defs.text(PROJECT_BUILD_TYPE).and_then(|t| t.parse().ok()),
            branch: non_empty(defs.text(PROJECT_BRANCH)),
            branch_code: defs
                .text(PROJECT_BRANCH_CODE)
                .and_then(|c| c.trim().chars().next())
                .and_then(BranchCode::from_char),
        };

        let text_or = |name: &str, default: &str| {
            non_empty(defs.text(name)).unwrap_or_else(|| default.to_owned())
        };
        let commit = CommitInfo {
            hash: text_or(PROJECT_COMMIT_HASH, UNKNOWN),
            short_hash: text_or(PROJECT_COMMIT_SHORT, UNKNOWN),
            author: text_or(PROJECT_COMMIT_AUTHOR, UNKNOWN),
            date: text_or(PROJECT_COMMIT_DATE, UNKNOWN),
        };

        Self {
            project: ProjectInfo {
                name: text_or(PROJECT_NAME, &defaults.project.name),
                author: text_or(PROJECT_AUTHOR, &defaults.project.author),
            },
            version,
            suffix: recorded.suffix.clone().unwrap_or_default(),
            tag: recorded.tag.clone().unwrap_or_default(),
            build,
            commit,
            recorded,
        }
    }

    /// Writes every field into `defs`: existing definitions are updated in place, missing ones
    /// appended. Build identity that was never generated is left out.
    pub fn write_to(&self, defs: &mut Definitions) {
        defs.set_text(PROJECT_NAME, &self.project.name);
        defs.set_text(PROJECT_AUTHOR, &self.project.author);

        defs.set_text(PROJECT_VERSION, &self.version.to_string());
        for (level, text, num) in COMPONENTS {
            let value = self.version.get(level);
            defs.set_text(text, &value.to_string());
            defs.set_number(num, i64::from(value));
        }
        defs.set_number(
            PROJECT_VERSION_NUM,
            i64::try_from(self.version.as_number()).unwrap_or(i64::MAX),
        );
        defs.set_text(PROJECT_VERSION_SUFFIX, &self.suffix);
        defs.set_text(PROJECT_VERSION_TAG, &self.tag);

        let counter = i64::try_from(self.build.counter).unwrap_or(i64::MAX);
        defs.set_text(PROJECT_BUILD, &counter.to_string());
        defs.set_number(PROJECT_BUILD_NUM, counter);
        if let Some(date) = &self.build.date {
            defs.set_text(PROJECT_BUILD_DATE, date);
        }
        if let Some(token) = &self.build.token {
            defs.set_text(PROJECT_BUILD_TOKEN, token);
        }
        if let Some(build_type) = self.build.build_type {
            defs.set_text(PROJECT_BUILD_TYPE, build_type.name());
            defs.set_text(PROJECT_BUILD_SUFFIX, &build_type.suffix().to_string());
        }
        if let Some(branch) = &self.build.branch {
            defs.set_text(PROJECT_BRANCH, branch);
        }
        if let Some(code) = self.build.branch_code {
            defs.set_text(PROJECT_BRANCH_CODE, &code.to_string());
        }

        defs.set_text(PROJECT_COMMIT_HASH, &self.commit.hash);
        defs.set_text(PROJECT_COMMIT_SHORT, &self.commit.short_hash);
        defs.set_text(PROJECT_COMMIT_AUTHOR, &self.commit.author);
        defs.set_text(PROJECT_COMMIT_DATE, &self.commit.date);
    }

    pub fn recorded(&self) -> &Recorded {
        &self.recorded
    }

    /// The version suffix, e.g. `-beta.1`, or empty.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The version tag, e.g. `BETA.1`, or empty.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The suffix, if it is one this crate writes.
    pub fn pre_release(&self) -> Option<PreRelease> {
        PreRelease::parse(&self.suffix)
    }

    /// Version with suffix, e.g. `1.2.3-beta.1`.
    pub fn full_version(&self) -> String {
        format!("{}{}", self.version, self.suffix)
    }

    fn touch(&mut self, today: Date) {
        self.build.date = Some(today.to_string());
    }

    /// Bumps the version at `level`, resetting lesser levels to zero. Any pre-release suffix and
    /// tag are cleared: a new version starts out unlabelled.
    pub fn bump(&mut self, level: SemLevel, today: Date) {
        let next = self.version.next(level);
        debug!(from = %self.version, to = %next, "bumping {} version", level.name());
        self.version = next;
        self.set_pre_release(None, today);
    }

    /// Increments the plain build counter and returns its new value.
    pub fn bump_build(&mut self, today: Date) -> u64 {
        self.build.counter = self.build.counter.saturating_add(1);
        self.touch(today);
        self.build.counter
    }

    /// Sets suffix and tag together; `None` clears both (a release).
    pub fn set_pre_release(&mut self, pre_release: Option<&PreRelease>, today: Date) {
        match pre_release {
            Some(pre) => {
                self.suffix = pre.suffix();
                self.tag = pre.tag();
            }
            None => {
                self.suffix.clear();
                self.tag.clear();
            }
        }
        self.touch(today);
    }

    pub fn attach_commit(&mut self, commit: CommitInfo, today: Date) {
        self.commit = commit;
        self.touch(today);
    }

    /// Records a freshly generated build token.
    pub(crate) fn record_build(
        &mut self,
        token: &BuildToken,
        branch: &str,
        code: BranchCode,
        build_type: BuildType,
        today: Date,
    ) {
        self.build.token = Some(token.to_string());
        self.build.build_type = Some(build_type);
        self.build.branch = Some(branch.to_owned());
        self.build.branch_code = Some(code);
        self.touch(today);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::PreReleaseKind;

    const FILE: &str = "\
#define PROJECT_NAME \"Demo\"
#define PROJECT_AUTHOR \"Someone\"
#define PROJECT_VERSION \"2.3.7\"
#define PROJECT_VERSION_MAJOR \"2\"
#define PROJECT_VERSION_MINOR \"3\"
#define PROJECT_VERSION_PATCH \"7\"
#define PROJECT_VERSION_MAJOR_NUM 2
#define PROJECT_VERSION_MINOR_NUM 3
#define PROJECT_VERSION_PATCH_NUM 7
#define PROJECT_VERSION_NUM 20307
#define PROJECT_VERSION_SUFFIX \"-beta.1\"
#define PROJECT_VERSION_TAG \"BETA.1\"
#define PROJECT_BUILD \"41\"
#define PROJECT_BUILD_DATE \"2024-01-01\"
";

    fn today() -> Date {
        Date::explicit(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_from_definitions() {
        let state = VersionState::from_definitions(&Definitions::parse(FILE));
        assert_eq!("Demo", state.project.name);
        assert_eq!("Someone", state.project.author);
        assert_eq!(VersionTriple::new(2, 3, 7), state.version);
        assert_eq!("-beta.1", state.suffix());
        assert_eq!("BETA.1", state.tag());
        assert_eq!(
            Some(PreRelease::new(PreReleaseKind::Beta, Some("1"))),
            state.pre_release()
        );
        assert_eq!(41, state.build.counter);
        assert_eq!(Some("2024-01-01".to_owned()), state.build.date);
        assert_eq!(None, state.build.token);
        assert!(state.commit.is_unknown());
        assert_eq!("2.3.7-beta.1", state.full_version());
    }

    #[test]
    fn test_defaults_for_empty_file() {
        let state = VersionState::from_definitions(&Definitions::parse(""));
        assert_eq!(VersionState::default(), state);
        assert_eq!("0.1.0", state.full_version());
    }

    #[test]
    fn test_version_falls_back_to_string_form() {
        let defs = Definitions::parse("#define PROJECT_VERSION \"4.5.6\"\n");
        let state = VersionState::from_definitions(&defs);
        assert_eq!(VersionTriple::new(4, 5, 6), state.version);
    }

    #[test]
    fn test_components_fall_back_to_numeric_forms() {
        let defs = Definitions::parse(
            "#define PROJECT_VERSION_MAJOR \"x\"\n\
             #define PROJECT_VERSION_MAJOR_NUM 3\n\
             #define PROJECT_VERSION_MINOR \"1\"\n\
             #define PROJECT_VERSION_PATCH \"0\"\n",
        );
        let state = VersionState::from_definitions(&defs);
        assert_eq!(VersionTriple::new(3, 1, 0), state.version);
    }

    #[test]
    fn test_bump_minor_clears_pre_release() {
        let mut state = VersionState::from_definitions(&Definitions::parse(FILE));
        state.bump(SemLevel::Minor, today());
        assert_eq!(VersionTriple::new(2, 4, 0), state.version);
        assert_eq!("", state.suffix());
        assert_eq!("", state.tag());
        assert_eq!(Some("2024-03-01".to_owned()), state.build.date);
    }

    #[test]
    fn test_set_pre_release_and_release() {
        let mut state = VersionState::default();
        state.set_pre_release(Some(&PreRelease::new(PreReleaseKind::Rc, Some("2"))), today());
        assert_eq!("-rc.2", state.suffix());
        assert_eq!("RC.2", state.tag());
        state.set_pre_release(None, today());
        assert_eq!("", state.suffix());
        assert_eq!("", state.tag());
    }

    #[test]
    fn test_bump_build() {
        let mut state = VersionState::from_definitions(&Definitions::parse(FILE));
        assert_eq!(42, state.bump_build(today()));
        let mut defs = Definitions::parse(FILE);
        state.write_to(&mut defs);
        let text = defs.to_string();
        assert!(text.contains("#define PROJECT_BUILD \"42\"\n"));
        assert!(text.contains("#define PROJECT_BUILD_NUM 42\n"));
    }

    #[test]
    fn test_write_then_read_back() {
        let mut defs = Definitions::parse(FILE);
        let mut state = VersionState::from_definitions(&defs);
        state.bump(SemLevel::Major, today());
        state.attach_commit(
            CommitInfo {
                hash: "0123456789abcdef0123456789abcdef01234567".to_owned(),
                short_hash: "0123456".to_owned(),
                author: "Ada".to_owned(),
                date: "2024-02-29".to_owned(),
            },
            today(),
        );
        state.write_to(&mut defs);

        let text = defs.to_string();
        assert!(text.contains("#define PROJECT_VERSION \"3.0.0\"\n"));
        assert!(text.contains("#define PROJECT_VERSION_NUM 30000\n"));
        assert!(text.contains("#define PROJECT_VERSION_MINOR_NUM 0\n"));
        assert!(text.contains("#define PROJECT_VERSION_SUFFIX \"\"\n"));
        assert!(text.ends_with("#define PROJECT_COMMIT_DATE \"2024-02-29\"\n"));
        assert!(!text.contains(PROJECT_BUILD_TOKEN));

        let reread = VersionState::from_definitions(&defs);
        assert_eq!(state.version, reread.version);
        assert_eq!(state.commit, reread.commit);
        assert_eq!(state.suffix(), reread.suffix());
    }
}
