use core::{
    fmt::{self, Display},
    str::FromStr,
};

/// The purpose of a build. Distinct from the [`BranchCode`](crate::BranchCode): a `dev` branch
/// built on a laptop is still a [`BuildType::Local`] build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildType {
    Internal,
    Developer,
    Beta,
    Release,
    Nightly,
    Snapshot,
    Ci,
    Local,
    Experimental,
}

impl BuildType {
    pub const ALL: [BuildType; 9] = [
        BuildType::Internal,
        BuildType::Developer,
        BuildType::Beta,
        BuildType::Release,
        BuildType::Nightly,
        BuildType::Snapshot,
        BuildType::Ci,
        BuildType::Local,
        BuildType::Experimental,
    ];

    /// The suffix character written at the end of build tokens.
    pub fn suffix(&self) -> char {
        match self {
            BuildType::Internal => 'i',
            BuildType::Developer => 'd',
            BuildType::Beta => 'b',
            BuildType::Release => 'r',
            BuildType::Nightly => 'n',
            BuildType::Snapshot => 's',
            BuildType::Ci => 'c',
            BuildType::Local => 'l',
            BuildType::Experimental => 'x',
        }
    }

    pub fn from_suffix(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.suffix() == c)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuildType::Internal => "internal",
            BuildType::Developer => "developer",
            BuildType::Beta => "beta",
            BuildType::Release => "release",
            BuildType::Nightly => "nightly",
            BuildType::Snapshot => "snapshot",
            BuildType::Ci => "ci",
            BuildType::Local => "local",
            BuildType::Experimental => "experimental",
        }
    }
}

impl Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuildType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown build type `{s}`"))
    }
}

const TAG_PREFIX: &str = "refs/tags/";
const HEAD_PREFIX: &str = "refs/heads/";

/// Environment variables whose presence means we are running under CI.
const CI_MARKERS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "JENKINS_URL",
    "BUILDKITE",
    "CIRCLECI",
    "TRAVIS",
    "TF_BUILD",
    "TEAMCITY_VERSION",
];

/// Environment variables holding a full ref (`refs/heads/...` or `refs/tags/...`).
const FULL_REF_VARS: &[&str] = &["GITHUB_REF"];

/// Environment variables holding a bare branch name.
const BRANCH_VARS: &[&str] = &[
    "CI_COMMIT_REF_NAME",
    "BRANCH_NAME",
    "GIT_BRANCH",
    "BUILDKITE_BRANCH",
    "CIRCLE_BRANCH",
];

/// Environment variables holding a bare tag name.
const TAG_VARS: &[&str] = &["CI_COMMIT_TAG", "CIRCLE_TAG", "BUILDKITE_TAG"];

/// Where a build is running: under CI or not, and which ref is being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub is_ci: bool,
    /// Always a full ref, `refs/heads/<branch>` or `refs/tags/<tag>`, or empty when unknown.
    pub git_ref: String,
    pub default_branch: String,
    pub integration_branch: String,
}

impl ExecutionContext {
    /// Creates a context for `git_ref`. A bare name (without a leading `refs/`) is taken to be a
    /// branch.
    pub fn new(is_ci: bool, git_ref: &str) -> Self {
        Self {
            is_ci,
            git_ref: normalize_ref(git_ref),
            default_branch: "main".to_owned(),
            integration_branch: "dev".to_owned(),
        }
    }

    pub fn with_branches(mut self, default_branch: &str, integration_branch: &str) -> Self {
        self.default_branch = default_branch.to_owned();
        self.integration_branch = integration_branch.to_owned();
        self
    }

    /// Reads the context from the process environment. An absence of CI markers means
    /// `is_ci == false`; a missing ref is left empty.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Self::from_env`], with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_ci = CI_MARKERS
            .iter()
            .any(|key| lookup(key).is_some_and(|v| !v.is_empty() && v != "false"));

        let first = |keys: &[&str]| keys.iter().find_map(|key| lookup(key).filter(|v| !v.is_empty()));

        let git_ref = first(FULL_REF_VARS)
            .or_else(|| first(TAG_VARS).map(|tag| format!("{TAG_PREFIX}{tag}")))
            .or_else(|| first(BRANCH_VARS))
            .unwrap_or_default();

        Self::new(is_ci, &git_ref)
    }

    /// The branch part of the ref, if the ref is a branch.
    pub fn branch_name(&self) -> Option<&str> {
        self.git_ref.strip_prefix(HEAD_PREFIX)
    }

    fn is_tag(&self) -> bool {
        self.git_ref.starts_with(TAG_PREFIX)
    }

    fn is_branch(&self, name: &str) -> bool {
        self.branch_name() == Some(name)
    }
}

/// Remote-tracking forms of a branch, as some CI servers report them (`GIT_BRANCH=origin/main`).
const REMOTE_PREFIXES: &[&str] = &["refs/remotes/origin/", "origin/"];

fn normalize_ref(git_ref: &str) -> String {
    let git_ref = git_ref.trim();
    let git_ref = REMOTE_PREFIXES
        .iter()
        .find_map(|prefix| git_ref.strip_prefix(prefix))
        .unwrap_or(git_ref);
    if git_ref.is_empty() || git_ref.starts_with("refs/") {
        git_ref.to_owned()
    } else {
        format!("{HEAD_PREFIX}{git_ref}")
    }
}

/// Decides the [`BuildType`] for an execution context. The first matching rule wins:
///
/// 1. CI building a tag: [`BuildType::Release`]
/// 2. CI building the default branch: [`BuildType::Release`]
/// 3. CI building the integration branch: [`BuildType::Developer`]
/// 4. CI building a ref containing `/alpha/`: [`BuildType::Internal`]
/// 5. CI building a ref containing `/beta/` or `/rc/`: [`BuildType::Beta`]
/// 6. CI building a ref containing `/hotfix/`: [`BuildType::Internal`]
/// 7. any other CI build: [`BuildType::Ci`]
/// 8. not CI: [`BuildType::Local`]
pub fn detect(ctx: &ExecutionContext) -> BuildType {
    if !ctx.is_ci {
        return BuildType::Local;
    }

    let r = ctx.git_ref.as_str();
    if ctx.is_tag() || ctx.is_branch(&ctx.default_branch) {
        BuildType::Release
    } else if ctx.is_branch(&ctx.integration_branch) {
        BuildType::Developer
    } else if r.contains("/alpha/") {
        BuildType::Internal
    } else if r.contains("/beta/") || r.contains("/rc/") {
        BuildType::Beta
    } else if r.contains("/hotfix/") {
        BuildType::Internal
    } else {
        BuildType::Ci
    }
}
