use crate::{
    build_type::ExecutionContext,
    counter::CounterFile,
    definitions::VersionFile,
};
use std::path::PathBuf;

pub const DEFAULT_VERSION_FILE: &str = "scripting/include/version.inc";
pub const DEFAULT_COUNTER_FILE: &str = ".build_counters.json";

/// Where things live and which branches are special. The CLI fills this from its arguments and
/// `VERSTAMP_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub version_file: PathBuf,
    pub counter_file: PathBuf,
    /// The git repository commit identity is read from.
    pub repo_dir: PathBuf,
    /// Building this branch under CI is a release build.
    pub default_branch: String,
    /// Building this branch under CI is a developer build.
    pub integration_branch: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version_file: PathBuf::from(DEFAULT_VERSION_FILE),
            counter_file: PathBuf::from(DEFAULT_COUNTER_FILE),
            repo_dir: PathBuf::from("."),
            default_branch: "main".to_owned(),
            integration_branch: "dev".to_owned(),
        }
    }
}

impl Config {
    pub fn version_store(&self) -> VersionFile {
        VersionFile::new(&self.version_file)
    }

    pub fn counter_store(&self) -> CounterFile {
        CounterFile::new(&self.counter_file)
    }

    /// The environment's execution context, judged against this config's special branches.
    pub fn execution_context(&self) -> ExecutionContext {
        ExecutionContext::from_env().with_branches(&self.default_branch, &self.integration_branch)
    }
}
