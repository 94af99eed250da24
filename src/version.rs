use chrono::{Local, NaiveDate, Utc};
use core::{
    fmt::{self, Display},
    ops::Deref,
    str::FromStr,
};

/// A level of a semantic version, like `major`, `minor`, or `patch`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SemLevel {
    /// The major level. It is greater than the minor and patch levels.
    Major,
    /// The minor level. It is less than the major level and greater than the patch level.
    Minor,
    /// The patch level. It is less than the major and minor levels.
    Patch,
}

impl SemLevel {
    pub fn name(&self) -> &'static str {
        match self {
            SemLevel::Major => "major",
            SemLevel::Minor => "minor",
            SemLevel::Patch => "patch",
        }
    }

    fn order_key(&self) -> u8 {
        match self {
            SemLevel::Major => 0,
            SemLevel::Minor => 1,
            SemLevel::Patch => 2,
        }
    }
}

impl PartialOrd for SemLevel {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemLevel {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        // reverse it so e.g. major > minor
        other.order_key().cmp(&self.order_key())
    }
}

/// A `major.minor.patch` version.
///
/// Its numeric form, [`VersionTriple::as_number`], packs the three values into one integer with
/// two decimal digits each for minor and patch. Values of 100 or more spill into the next field;
/// that is a limitation of the format and is not corrected here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VersionTriple {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionTriple {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses `"1.2.3"`. A leading `v` is accepted. Returns `None` for anything else.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix(|c: char| c == 'v' || c == 'V').unwrap_or(s);
        let mut parts = s.split('.').map(|p| p.parse::<u32>().ok());
        let triple = Self::new(parts.next()??, parts.next()??, parts.next()??);
        match parts.next() {
            None => Some(triple),
            Some(_) => None,
        }
    }

    /// `major * 10000 + minor * 100 + patch`.
    pub fn as_number(&self) -> u64 {
        u64::from(self.major) * 10_000 + u64::from(self.minor) * 100 + u64::from(self.patch)
    }

    pub fn get(&self, level: SemLevel) -> u32 {
        match level {
            SemLevel::Major => self.major,
            SemLevel::Minor => self.minor,
            SemLevel::Patch => self.patch,
        }
    }

    /// Returns a new version where the value of the given [`SemLevel`] is incremented, and all
    /// lesser values are reset to zero.
    ///
    /// ```
    /// use verstamp::{SemLevel, VersionTriple};
    ///
    /// let version = VersionTriple::new(1, 2, 3);
    /// assert_eq!("2.0.0", version.next(SemLevel::Major).to_string());
    /// assert_eq!("1.3.0", version.next(SemLevel::Minor).to_string());
    /// assert_eq!("1.2.4", version.next(SemLevel::Patch).to_string());
    /// ```
    pub fn next(&self, level: SemLevel) -> Self {
        let bump = |this: SemLevel, value: u32| {
            if this == level {
                value.saturating_add(1)
            } else if this < level {
                0
            } else {
                value
            }
        };
        Self {
            major: bump(SemLevel::Major, self.major),
            minor: bump(SemLevel::Minor, self.minor),
            patch: bump(SemLevel::Patch, self.patch),
        }
    }
}

impl Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The kinds of pre-release labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreReleaseKind {
    Snapshot,
    Alpha,
    Beta,
    Rc,
    Hotfix,
}

impl PreReleaseKind {
    const ALL: [PreReleaseKind; 5] = [
        PreReleaseKind::Snapshot,
        PreReleaseKind::Alpha,
        PreReleaseKind::Beta,
        PreReleaseKind::Rc,
        PreReleaseKind::Hotfix,
    ];

    /// How the kind is spelled in the suffix. Snapshots are uppercase by convention.
    pub fn label(&self) -> &'static str {
        match self {
            PreReleaseKind::Snapshot => "SNAPSHOT",
            PreReleaseKind::Alpha => "alpha",
            PreReleaseKind::Beta => "beta",
            PreReleaseKind::Rc => "rc",
            PreReleaseKind::Hotfix => "hotfix",
        }
    }

    /// The qualifier used when none is given: `1` for numbered kinds, none for snapshots.
    pub fn default_qualifier(&self) -> Option<&'static str> {
        match self {
            PreReleaseKind::Snapshot => None,
            _ => Some("1"),
        }
    }
}

/// A pre-release label such as `-beta.2` or `-SNAPSHOT`.
///
/// The qualifier is free-form: a number, or an opaque token like a short commit hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreRelease {
    pub kind: PreReleaseKind,
    pub qualifier: Option<String>,
}

impl PreRelease {
    /// Creates a label, falling back to the kind's default qualifier when `qualifier` is `None`
    /// or blank.
    pub fn new(kind: PreReleaseKind, qualifier: Option<&str>) -> Self {
        let qualifier = qualifier
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .or(kind.default_qualifier())
            .map(str::to_owned);
        Self { kind, qualifier }
    }

    /// The suffix appended to the version, e.g. `-alpha.1`.
    pub fn suffix(&self) -> String {
        format!("-{}", self.body(self.kind.label()))
    }

    /// The tag, e.g. `ALPHA.1`.
    pub fn tag(&self) -> String {
        self.body(&self.kind.label().to_uppercase())
    }

    fn body(&self, label: &str) -> String {
        match &self.qualifier {
            Some(q) => format!("{label}.{q}"),
            None => label.to_owned(),
        }
    }

    /// Parses a suffix as written by [`PreRelease::suffix`]. The kind is matched
    /// case-insensitively; unknown kinds give `None`.
    pub fn parse(suffix: &str) -> Option<Self> {
        let body = suffix.trim().strip_prefix('-')?;
        let (label, qualifier) = match body.split_once('.') {
            Some((label, qualifier)) => (label, Some(qualifier.to_owned())),
            None => (body, None),
        };
        let kind = PreReleaseKind::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(label))?;
        Some(Self { kind, qualifier })
    }
}

/// A calendar date, as written to `PROJECT_BUILD_DATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date(NaiveDate);

impl Date {
    /// Returns a new [Date] representing the current date in UTC at the time of this call.
    pub fn utc_now() -> Self {
        Self(Utc::now().date_naive())
    }

    /// Returns a new [Date] representing the current date in the system's local timezone at the
    /// time of this call.
    pub fn local_now() -> Self {
        Self(Local::now().date_naive())
    }

    /// Returns the given date, or `None` if it does not exist.
    pub fn explicit(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }
}

impl FromStr for Date {
    type Err = chrono::ParseError;

    /// Parses `YYYY-MM-DD`. See [NaiveDate::from_str].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(NaiveDate::from_str(s)?))
    }
}

impl Deref for Date {
    type Target = NaiveDate;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}
