//! # verstamp
//!
//! Maintains a project's version and build identity as `#define` lines in a header-style file.
//!
//! The file is read into a [`VersionState`], changed by an operation (bump a version level, set
//! a pre-release suffix, attach commit identity, generate a build number), and written back with
//! every other line left as it was.
//!
//! ## Build numbers
//!
//! A build number is a fixed-width token such as `01D0001d`:
//!
//! | Part | Example | Meaning |
//! |---|---|---|
//! | major | `01` | major version, two digits |
//! | branch code | `D` | what kind of branch was built, see [`BranchCode`] |
//! | sequence | `0001` | per-branch counter, four digits |
//! | build type | `d` | why it was built, see [`BuildType`] |
//!
//! Sequences are counted per branch code in a small JSON store (see [`CounterFile`]), so builds
//! of `feature/*` branches and of `main` never hand out the same token. Counters only go up.
//!
//! ```
//! use verstamp::prelude::*;
//!
//! let mut state = VersionState::default();
//! state.version = VersionTriple::new(1, 4, 0);
//!
//! let ctx = ExecutionContext::new(true, "refs/heads/dev");
//! let counters = MemoryCounters::default();
//! let token = generate_build_number(&mut state, "dev", &ctx, None, &counters, Date::utc_now())
//!     .unwrap();
//! assert_eq!("01D0001d", token.as_str());
//!
//! let parts = decode(token.as_str()).unwrap();
//! assert_eq!(Some(BranchCode::Dev), parts.branch());
//! assert_eq!(Some(BuildType::Developer), parts.build_type());
//! ```
//!
//! ## Versions
//!
//! ```
//! use verstamp::prelude::*;
//!
//! let defs = Definitions::parse(
//!     "#define PROJECT_VERSION \"2.3.7\"\n#define PROJECT_VERSION_SUFFIX \"-beta.1\"\n",
//! );
//! let mut state = VersionState::from_definitions(&defs);
//! state.bump(SemLevel::Minor, Date::utc_now());
//! assert_eq!("2.4.0", state.full_version());
//! ```
//!
//! ## Prelude
//!
//! ```
//! use verstamp::prelude::*;
//! ```

mod branch;
mod build_type;
mod codec;
pub mod config;
mod counter;
mod definitions;
mod error;
pub mod state;
mod validate;
pub mod vcs;
mod version;

pub use crate::branch::{classify, BranchCode};
pub use crate::build_type::{detect, BuildType, ExecutionContext};
pub use crate::codec::{decode, encode, generate_build_number, BuildComponents, BuildToken};
pub use crate::config::Config;
pub use crate::counter::{CounterFile, CounterPersistence, CounterStore, MemoryCounters};
pub use crate::definitions::{Definitions, MemoryFile, Value, VersionFile, VersionStore};
pub use crate::error::{CodecError, Error, FileError, StoreError};
pub use crate::state::VersionState;
pub use crate::validate::{validate, Discrepancy};
pub use crate::vcs::CommitInfo;
pub use crate::version::{Date, PreRelease, PreReleaseKind, SemLevel, VersionTriple};

/// A convenience module appropriate for glob imports (`use verstamp::prelude::*;`).
pub mod prelude {
    #[doc(no_inline)]
    pub use crate::{
        classify, decode, detect, encode, generate_build_number, validate, BranchCode,
        BuildComponents, BuildToken, BuildType, CodecError, CommitInfo, Config, CounterFile,
        CounterPersistence, CounterStore, Date, Definitions, Discrepancy, Error,
        ExecutionContext, FileError, MemoryCounters, MemoryFile, PreRelease, PreReleaseKind,
        SemLevel, StoreError, VersionFile, VersionState, VersionStore, VersionTriple,
    };
}
