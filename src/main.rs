use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use verstamp::{
    config::{DEFAULT_COUNTER_FILE, DEFAULT_VERSION_FILE},
    decode, generate_build_number, validate,
    vcs::{self, UNKNOWN},
    BuildType, CodecError, Config, CounterPersistence, Date, FileError, PreRelease,
    PreReleaseKind, SemLevel, VersionState, VersionStore,
};

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    LibraryError(#[from] verstamp::Error),

    #[error("{0}")]
    FileError(#[from] FileError),

    #[error("{0}")]
    CodecError(#[from] CodecError),
}

/// Where to find things. Every option can also be set through its environment variable.
#[derive(Args, Debug)]
struct GlobalArgs {
    /// The version definitions file
    #[arg(long, global = true, env = "VERSTAMP_FILE", default_value = DEFAULT_VERSION_FILE)]
    file: PathBuf,

    /// The JSON file holding per-branch build counters
    #[arg(
        long,
        global = true,
        env = "VERSTAMP_COUNTER_FILE",
        default_value = DEFAULT_COUNTER_FILE
    )]
    counter_file: PathBuf,

    /// The git repository to read commit information from
    #[arg(long, global = true, env = "VERSTAMP_REPO", default_value = ".")]
    repo: PathBuf,

    /// The branch whose CI builds are release builds
    #[arg(long, global = true, env = "VERSTAMP_DEFAULT_BRANCH", default_value = "main")]
    default_branch: String,

    /// The branch whose CI builds are developer builds
    #[arg(long, global = true, env = "VERSTAMP_INTEGRATION_BRANCH", default_value = "dev")]
    integration_branch: String,

    /// Log decisions as well as changes
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl GlobalArgs {
    fn to_config(&self) -> Config {
        Config {
            version_file: self.file.clone(),
            counter_file: self.counter_file.clone(),
            repo_dir: self.repo.clone(),
            default_branch: self.default_branch.clone(),
            integration_branch: self.integration_branch.clone(),
        }
    }
}

/// The date stamped into `PROJECT_BUILD_DATE`. Defaults to the current local date.
#[derive(Args, Debug)]
struct DateArg {
    /// [DATE PROVIDER] Use the current UTC date. Exclusive with other date providers.
    #[arg(long, global = true)]
    utc: bool,

    /// [DATE PROVIDER] Use a date in format `YYYY-MM-DD`. Exclusive with other date providers.
    #[arg(long, global = true, value_name = "YYYY-MM-DD", conflicts_with = "utc")]
    date: Option<Date>,
}

impl DateArg {
    fn to_date(&self) -> Date {
        match (self.utc, self.date) {
            (_, Some(date)) => date,
            (true, None) => Date::utc_now(),
            (false, None) => Date::local_now(),
        }
    }
}

/// Maintains the version and build identity recorded in a project's definitions file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(flatten)]
    date: DateArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Shows the project, version, build and commit information
    Info,

    /// Checks that the recorded version forms agree with each other. Exits 1 if they do not.
    Validate,

    /// Shows the per-branch build counters
    History,

    /// Increments the major version, resetting minor and patch and clearing any pre-release
    Major,

    /// Increments the minor version, resetting patch and clearing any pre-release
    Minor,

    /// Increments the patch version and clears any pre-release
    Patch,

    /// Increments the plain build counter
    Build,

    /// Generates the next build number for a branch and records it.
    ///
    /// The branch defaults to the one named by the CI environment, then the checked-out branch.
    /// The build type defaults to the one detected from the CI environment.
    BuildNumber {
        /// The branch being built
        #[arg(short, long)]
        branch: Option<String>,

        /// Overrides the detected build type (e.g. `release`, `nightly`, `local`)
        #[arg(short = 't', long)]
        build_type: Option<BuildType>,
    },

    /// Marks the version as a snapshot, e.g. `1.2.3-SNAPSHOT`
    Snapshot {
        /// Optional qualifier, e.g. `2` for `-SNAPSHOT.2`
        qualifier: Option<String>,
    },

    /// Marks the version as an alpha, e.g. `1.2.3-alpha.1`
    Alpha {
        /// The alpha number (default `1`)
        qualifier: Option<String>,
    },

    /// Marks the version as a beta, e.g. `1.2.3-beta.1`
    Beta {
        /// The beta number (default `1`)
        qualifier: Option<String>,
    },

    /// Marks the version as a release candidate, e.g. `1.2.3-rc.1`
    Rc {
        /// The candidate number (default `1`)
        qualifier: Option<String>,
    },

    /// Marks the version as a hotfix, e.g. `1.2.3-hotfix.1`
    Hotfix {
        /// The hotfix number (default `1`)
        qualifier: Option<String>,
    },

    /// Clears any pre-release suffix and tag
    Release,

    /// Records the `HEAD` commit of the repository
    Commit,

    /// Explains a build number
    Decode {
        /// The token to decode, e.g. `01D0001d`
        token: String,
    },

    /// Prints the version, e.g. `1.2.3`
    GetVersion,

    /// Prints the pre-release suffix, e.g. `-beta.1`, or nothing
    GetSuffix,

    /// Prints the version with its suffix, e.g. `1.2.3-beta.1`
    GetFullVersion,
}

type Output = (String, i32);

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    debug!(?cli, "parsed arguments");

    match do_work(cli) {
        Ok((output, exit_code)) => {
            if !output.is_empty() {
                println!("{output}");
            }
            std::process::exit(exit_code);
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn do_work(cli: Cli) -> Result<Output, CliError> {
    let config = cli.global.to_config();
    let today = cli.date.to_date();
    run(
        cli.command,
        &config,
        today,
        &config.version_store(),
        &config.counter_store(),
    )
}

/// Loads the definitions, applies `change`, and saves the result. `change` returns the message
/// to print.
fn mutate<S, F>(store: &S, change: F) -> Result<Output, CliError>
where
    S: VersionStore,
    F: FnOnce(&mut VersionState) -> Result<String, CliError>,
{
    let mut defs = store.load()?;
    let mut state = VersionState::from_definitions(&defs);
    let message = change(&mut state)?;
    state.write_to(&mut defs);
    store.save(&defs)?;
    Ok((message, 0))
}

fn pre_release(
    store: &impl VersionStore,
    kind: PreReleaseKind,
    qualifier: Option<String>,
    today: Date,
) -> Result<Output, CliError> {
    let pre = PreRelease::new(kind, qualifier.as_deref());
    mutate(store, |state| {
        state.set_pre_release(Some(&pre), today);
        Ok(format!("Version is now {}", state.full_version()))
    })
}

fn bump(store: &impl VersionStore, level: SemLevel, today: Date) -> Result<Output, CliError> {
    mutate(store, |state| {
        let from = state.full_version();
        state.bump(level, today);
        Ok(format!(
            "Bumped {} version: {from} -> {}",
            level.name(),
            state.full_version()
        ))
    })
}

fn load_state(store: &impl VersionStore) -> Result<VersionState, CliError> {
    Ok(VersionState::from_definitions(&store.load()?))
}

fn info(state: &VersionState) -> String {
    let mut lines = vec![
        format!("Project:      {}", state.project.name),
        format!("Author:       {}", state.project.author),
        format!("Version:      {}", state.full_version()),
    ];
    if !state.tag().is_empty() {
        lines.push(format!("Tag:          {}", state.tag()));
    }
    lines.push(format!(
        "Build:        {} ({})",
        state.build.counter,
        state.build.date.as_deref().unwrap_or(UNKNOWN)
    ));
    if let Some(token) = &state.build.token {
        let build_type = state.build.build_type.map_or(UNKNOWN, |t| t.name());
        let branch = state.build.branch.as_deref().unwrap_or(UNKNOWN);
        lines.push(format!("Build number: {token} ({build_type}, {branch})"));
    }
    lines.push(if state.commit.is_unknown() {
        format!("Commit:       {UNKNOWN}")
    } else {
        format!(
            "Commit:       {} by {} on {}",
            state.commit.short_hash, state.commit.author, state.commit.date
        )
    });
    lines.join("\n")
}

fn history(counters: &impl CounterPersistence) -> String {
    let store = counters.load();
    let mut lines = vec![format!("Major version: {}", store.major_version)];
    for (code, count) in &store.branch_counters {
        lines.push(format!("  {code}  {:<20} {count}", code.description()));
    }
    lines.push(format!("Total builds:  {}", store.total_builds));
    lines.push(format!(
        "Last build:    {}",
        store
            .last_build_date
            .map_or_else(|| "never".to_owned(), |d| d.to_rfc3339())
    ));
    lines.join("\n")
}

fn run<S, P>(
    command: Commands,
    config: &Config,
    today: Date,
    store: &S,
    counters: &P,
) -> Result<Output, CliError>
where
    S: VersionStore,
    P: CounterPersistence,
{
    match command {
        Commands::Info => Ok((info(&load_state(store)?), 0)),
        Commands::Validate => {
            let issues = validate(&load_state(store)?);
            if issues.is_empty() {
                Ok(("Version information is consistent".to_owned(), 0))
            } else {
                let lines: Vec<String> = issues.iter().map(ToString::to_string).collect();
                Ok((lines.join("\n"), 1))
            }
        }
        Commands::History => Ok((history(counters), 0)),
        Commands::Major => bump(store, SemLevel::Major, today),
        Commands::Minor => bump(store, SemLevel::Minor, today),
        Commands::Patch => bump(store, SemLevel::Patch, today),
        Commands::Build => mutate(store, |state| {
            Ok(format!("Build number is now {}", state.bump_build(today)))
        }),
        Commands::BuildNumber { branch, build_type } => {
            let ctx = config.execution_context();
            let branch = branch
                .or_else(|| ctx.branch_name().map(str::to_owned))
                .or_else(|| vcs::current_branch(&config.repo_dir))
                .unwrap_or_else(|| UNKNOWN.to_owned());
            mutate(store, |state| {
                let token =
                    generate_build_number(state, &branch, &ctx, build_type, counters, today)?;
                Ok(token.to_string())
            })
        }
        Commands::Snapshot { qualifier } => {
            pre_release(store, PreReleaseKind::Snapshot, qualifier, today)
        }
        Commands::Alpha { qualifier } => pre_release(store, PreReleaseKind::Alpha, qualifier, today),
        Commands::Beta { qualifier } => pre_release(store, PreReleaseKind::Beta, qualifier, today),
        Commands::Rc { qualifier } => pre_release(store, PreReleaseKind::Rc, qualifier, today),
        Commands::Hotfix { qualifier } => {
            pre_release(store, PreReleaseKind::Hotfix, qualifier, today)
        }
        Commands::Release => mutate(store, |state| {
            state.set_pre_release(None, today);
            Ok(format!("Version is now {}", state.full_version()))
        }),
        Commands::Commit => {
            let commit = vcs::head_commit(&config.repo_dir);
            mutate(store, |state| {
                let message = format!("Recorded commit {}", commit.short_hash);
                state.attach_commit(commit, today);
                Ok(message)
            })
        }
        Commands::Decode { token } => {
            let parts = decode(&token)?;
            let mut lines = vec![
                format!("Token:      {token}"),
                format!("Major:      {}", parts.major),
                format!("Branch:     {} ({})", parts.branch_code, parts.branch_name),
                format!("Sequence:   {}", parts.sequence),
            ];
            if let Some(suffix) = parts.suffix {
                lines.push(format!("Build type: {suffix} ({})", parts.build_type_name));
            }
            Ok((lines.join("\n"), 0))
        }
        Commands::GetVersion => Ok((load_state(store)?.version.to_string(), 0)),
        Commands::GetSuffix => Ok((load_state(store)?.suffix().to_owned(), 0)),
        Commands::GetFullVersion => Ok((load_state(store)?.full_version(), 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use verstamp::{MemoryCounters, MemoryFile};

    const FILE: &str = "\
// generated, do not edit by hand
#define PROJECT_NAME \"Demo\"
#define PROJECT_VERSION \"1.4.2\"
#define PROJECT_VERSION_MAJOR \"1\"
#define PROJECT_VERSION_MINOR \"4\"
#define PROJECT_VERSION_PATCH \"2\"
#define PROJECT_VERSION_MAJOR_NUM 1
#define PROJECT_VERSION_MINOR_NUM 4
#define PROJECT_VERSION_PATCH_NUM 2
#define PROJECT_VERSION_NUM 10402
#define PROJECT_VERSION_SUFFIX \"\"
#define PROJECT_VERSION_TAG \"\"
";

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["verstamp"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn run_on(args: &[&str], store: &MemoryFile, counters: &MemoryCounters) -> Output {
        let cli = parse(args);
        let config = cli.global.to_config();
        let today = cli.date.to_date();
        run(cli.command, &config, today, store, counters).unwrap()
    }

    #[test]
    fn test_global_defaults() {
        let cli = parse(&["info"]);
        let config = cli.global.to_config();
        assert_eq!(PathBuf::from(DEFAULT_VERSION_FILE), config.version_file);
        assert_eq!("main", config.default_branch);
        assert!(!cli.global.verbose);
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = parse(&["major", "--file", "v.inc", "--date", "2024-03-01", "-v"]);
        assert_eq!(PathBuf::from("v.inc"), cli.global.file);
        assert_eq!(Date::explicit(2024, 3, 1), Some(cli.date.to_date()));
        assert!(cli.global.verbose);
    }

    #[test]
    fn test_date_providers_are_exclusive() {
        assert!(Cli::try_parse_from(["verstamp", "--utc", "--date", "2024-01-01", "info"]).is_err());
    }

    #[rstest]
    #[case(&["major"], "2.0.0")]
    #[case(&["minor"], "1.5.0")]
    #[case(&["patch"], "1.4.3")]
    #[case(&["alpha"], "1.4.2-alpha.1")]
    #[case(&["beta", "3"], "1.4.2-beta.3")]
    #[case(&["rc"], "1.4.2-rc.1")]
    #[case(&["hotfix", "2"], "1.4.2-hotfix.2")]
    #[case(&["snapshot"], "1.4.2-SNAPSHOT")]
    fn test_mutations(#[case] args: &[&str], #[case] expected: &str) {
        let store = MemoryFile::new(FILE);
        let counters = MemoryCounters::default();
        let mut argv = args.to_vec();
        argv.extend(["--date", "2024-03-01"]);
        run_on(&argv, &store, &counters);

        let (version, code) = run_on(&["get-full-version"], &store, &counters);
        assert_eq!((expected, 0), (version.as_str(), code));

        let text = store.text().unwrap();
        assert!(text.starts_with("// generated, do not edit by hand\n"));
        assert!(text.contains("#define PROJECT_BUILD_DATE \"2024-03-01\"\n"));
        let state = VersionState::from_definitions(&verstamp::Definitions::parse(&text));
        assert!(validate(&state).is_empty());
    }

    #[test]
    fn test_release_clears_suffix() {
        let store = MemoryFile::new(FILE);
        let counters = MemoryCounters::default();
        run_on(&["beta"], &store, &counters);
        assert_eq!("-beta.1", run_on(&["get-suffix"], &store, &counters).0);
        run_on(&["release"], &store, &counters);
        assert_eq!("", run_on(&["get-suffix"], &store, &counters).0);
        assert_eq!("1.4.2", run_on(&["get-version"], &store, &counters).0);
    }

    #[test]
    fn test_validate_exit_code() {
        let counters = MemoryCounters::default();
        let good = MemoryFile::new(FILE);
        assert_eq!(0, run_on(&["validate"], &good, &counters).1);

        let bad = MemoryFile::new(&FILE.replace("NUM 10402", "NUM 10500"));
        let (output, code) = run_on(&["validate"], &bad, &counters);
        assert_eq!(1, code);
        assert!(output.starts_with("PROJECT_VERSION_NUM"));
    }

    #[test]
    fn test_build_number_and_history() {
        let store = MemoryFile::new(FILE);
        let counters = MemoryCounters::default();
        let args = ["build-number", "--branch", "feature/login", "--build-type", "ci"];
        assert_eq!("01F0001c", run_on(&args, &store, &counters).0);
        assert_eq!("01F0002c", run_on(&args, &store, &counters).0);

        let text = store.text().unwrap();
        assert!(text.contains("#define PROJECT_BUILD_TOKEN \"01F0002c\"\n"));
        assert!(text.contains("#define PROJECT_BRANCH \"feature/login\"\n"));

        let (history, _) = run_on(&["history"], &store, &counters);
        assert!(history.contains("Total builds:  2"));
        assert!(history.contains("  F  "));
    }

    #[test]
    fn test_build_number_honours_date_provider() {
        let store = MemoryFile::new(FILE);
        let counters = MemoryCounters::default();
        let args = ["build-number", "--branch", "dev", "--build-type", "ci", "--date", "2001-02-03"];
        assert_eq!("01D0001c", run_on(&args, &store, &counters).0);
        let text = store.text().unwrap();
        assert!(text.contains("#define PROJECT_BUILD_DATE \"2001-02-03\"\n"));
    }

    #[test]
    fn test_decode() {
        let store = MemoryFile::default();
        let counters = MemoryCounters::default();
        let (output, code) = run_on(&["decode", "01D0001d"], &store, &counters);
        assert_eq!(0, code);
        assert!(output.contains("Branch:     D (dev (development))"));
        assert!(output.contains("Sequence:   1"));

        let cli = parse(&["decode", "01D"]);
        let today = Date::utc_now();
        let err = run(cli.command, &Config::default(), today, &store, &counters);
        assert!(matches!(err, Err(CliError::CodecError(CodecError::TooShort { .. }))));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let store = MemoryFile::default();
        let counters = MemoryCounters::default();
        let cli = parse(&["major"]);
        let today = Date::utc_now();
        let result = run(cli.command, &Config::default(), today, &store, &counters);
        assert!(matches!(result, Err(CliError::FileError(FileError::NotFound { .. }))));
    }
}
