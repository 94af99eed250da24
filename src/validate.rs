use crate::{
    state::{
        VersionState, COMPONENTS, PROJECT_VERSION, PROJECT_VERSION_NUM, PROJECT_VERSION_TAG,
    },
    version::PreRelease,
};
use core::fmt::{self, Display};

/// One disagreement between two forms of the same fact in the definitions file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    /// The definition whose value is off.
    pub field: &'static str,
    pub expected: String,
    /// What the file holds; `None` if the definition is missing.
    pub found: Option<String>,
}

impl Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.found {
            Some(found) => write!(
                f,
                "{}: expected `{}`, found `{}`",
                self.field, self.expected, found
            ),
            None => write!(f, "{}: expected `{}`, but it is missing", self.field, self.expected),
        }
    }
}

/// Checks that the recorded version forms agree with each other.
///
/// The version triple (as read from the component definitions) is the reference:
/// `PROJECT_VERSION_NUM` is recomputed from it, `PROJECT_VERSION` must be its string form, each
/// `_NUM` component must match its string twin, and a recognized suffix must come with its tag.
/// Every mismatch is reported. Nothing is modified, so repeated calls give the same result.
///
/// ```
/// use verstamp::{validate, Definitions, VersionState};
///
/// let defs = Definitions::parse(
///     "#define PROJECT_VERSION \"1.2.3\"\n#define PROJECT_VERSION_NUM 10300\n",
/// );
/// let issues = validate(&VersionState::from_definitions(&defs));
/// assert_eq!(1, issues.len());
/// assert_eq!("PROJECT_VERSION_NUM", issues[0].field);
/// ```
pub fn validate(state: &VersionState) -> Vec<Discrepancy> {
    let recorded = state.recorded();
    let mut issues = Vec::new();

    let expected_num = state.version.as_number();
    if recorded.version_num.and_then(|n| u64::try_from(n).ok()) != Some(expected_num) {
        issues.push(Discrepancy {
            field: PROJECT_VERSION_NUM,
            expected: expected_num.to_string(),
            found: recorded.version_num.map(|n| n.to_string()),
        });
    }

    let expected_version = state.version.to_string();
    if recorded.version.as_deref().map(str::trim) != Some(expected_version.as_str()) {
        issues.push(Discrepancy {
            field: PROJECT_VERSION,
            expected: expected_version,
            found: recorded.version.clone(),
        });
    }

    for (idx, (_, text_name, num_name)) in COMPONENTS.into_iter().enumerate() {
        let text = recorded.components[idx].as_deref().map(str::trim);
        let num = recorded.component_nums[idx];
        match (text, num) {
            (Some(text), Some(num)) if text.parse::<i64>().ok() != Some(num) => {
                issues.push(Discrepancy {
                    field: num_name,
                    expected: text.to_owned(),
                    found: Some(num.to_string()),
                });
            }
            (Some(_), Some(_)) => {}
            // one of the pair is missing; the other one is the reference
            (Some(text), None) => issues.push(Discrepancy {
                field: num_name,
                expected: text.to_owned(),
                found: None,
            }),
            (None, Some(num)) => issues.push(Discrepancy {
                field: text_name,
                expected: num.to_string(),
                found: None,
            }),
            (None, None) => {}
        }
    }

    if let Some(pre) = PreRelease::parse(state.suffix()) {
        if state.tag() != pre.tag() {
            issues.push(Discrepancy {
                field: PROJECT_VERSION_TAG,
                expected: pre.tag(),
                found: recorded.tag.clone(),
            });
        }
    } else if state.suffix().is_empty() && !state.tag().is_empty() {
        issues.push(Discrepancy {
            field: PROJECT_VERSION_TAG,
            expected: String::new(),
            found: recorded.tag.clone(),
        });
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::Definitions;
    use rstest::rstest;

    fn file(num: &str, suffix: &str, tag: &str) -> String {
        format!(
            "#define PROJECT_VERSION \"1.2.3\"\n\
             #define PROJECT_VERSION_MAJOR \"1\"\n\
             #define PROJECT_VERSION_MINOR \"2\"\n\
             #define PROJECT_VERSION_PATCH \"3\"\n\
             #define PROJECT_VERSION_MAJOR_NUM 1\n\
             #define PROJECT_VERSION_MINOR_NUM 2\n\
             #define PROJECT_VERSION_PATCH_NUM 3\n\
             #define PROJECT_VERSION_NUM {num}\n\
             #define PROJECT_VERSION_SUFFIX \"{suffix}\"\n\
             #define PROJECT_VERSION_TAG \"{tag}\"\n"
        )
    }

    fn check(text: &str) -> Vec<Discrepancy> {
        validate(&VersionState::from_definitions(&Definitions::parse(text)))
    }

    #[rstest]
    #[case("10203", "", "")]
    #[case("10203", "-beta.1", "BETA.1")]
    #[case("10203", "-SNAPSHOT", "SNAPSHOT")]
    fn test_consistent(#[case] num: &str, #[case] suffix: &str, #[case] tag: &str) {
        assert_eq!(Vec::<Discrepancy>::new(), check(&file(num, suffix, tag)));
    }

    #[test]
    fn test_stale_version_num() {
        let issues = check(&file("10300", "", ""));
        assert_eq!(
            vec![Discrepancy {
                field: PROJECT_VERSION_NUM,
                expected: "10203".to_owned(),
                found: Some("10300".to_owned()),
            }],
            issues
        );
    }

    #[test]
    fn test_reports_every_mismatch() {
        let text = file("10300", "-rc.1", "BETA.1")
            .replace("PATCH_NUM 3", "PATCH_NUM 4")
            .replace("\"1.2.3\"", "\"1.2.4\"");
        let fields: Vec<_> = check(&text).into_iter().map(|d| d.field).collect();
        assert_eq!(
            vec![
                PROJECT_VERSION_NUM,
                PROJECT_VERSION,
                "PROJECT_VERSION_PATCH_NUM",
                PROJECT_VERSION_TAG
            ],
            fields
        );
    }

    #[test]
    fn test_missing_twin_and_stray_tag() {
        let text = file("10203", "", "ALPHA.1").replace("#define PROJECT_VERSION_MINOR_NUM 2\n", "");
        let issues = check(&text);
        assert_eq!(2, issues.len());
        assert_eq!("PROJECT_VERSION_MINOR_NUM", issues[0].field);
        assert_eq!(None, issues[0].found);
        assert_eq!(PROJECT_VERSION_TAG, issues[1].field);
    }

    #[test]
    fn test_validate_is_idempotent_and_read_only() {
        let state = VersionState::from_definitions(&Definitions::parse(&file("10300", "", "")));
        let before = state.clone();
        assert_eq!(validate(&state), validate(&state));
        assert_eq!(before, state);
    }
}
