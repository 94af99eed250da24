//! The definitions file: `#define NAME "value"` and `#define NAME 123` lines among arbitrary
//! other text.
//!
//! The whole file is parsed into a [`Definitions`] record, mutated, and written back in one go.
//! Lines that are not simple definitions are kept byte-for-byte, as is the spacing and any
//! trailing comment around a definition whose value changes.

use crate::error::FileError;
use core::fmt::{self, Display};
use std::{
    cell::RefCell,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info};

const DEFINE: &str = "#define";

/// The value of one definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A quoted string, held unescaped.
    Str(String),
    /// A bare integer.
    Num(i64),
}

impl Value {
    /// The value as text; numbers are rendered in decimal.
    pub fn text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Num(n) => n.to_string(),
        }
    }

    /// The value as a number. Quoted strings holding an integer count.
    pub fn number(&self) -> Option<i64> {
        match self {
            Value::Str(s) => s.trim().parse().ok(),
            Value::Num(n) => Some(*n),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        _ => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
            Value::Num(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Define {
    /// Everything before the name, e.g. `#define ` with its indentation.
    lead: String,
    name: String,
    /// Whitespace between name and value.
    gap: String,
    value: Value,
    /// The value exactly as written in the file. Dropped once the value changes.
    raw: Option<String>,
    /// Everything after the value, e.g. a comment or a `\r`.
    trail: String,
}

impl Display for Define {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.lead, self.name, self.gap)?;
        match &self.raw {
            Some(raw) => f.write_str(raw)?,
            None => write!(f, "{}", self.value)?,
        }
        f.write_str(&self.trail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Define(Define),
    /// Any other line, kept verbatim.
    Literal(String),
}

impl Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Define(define) => define.fmt(f),
            Line::Literal(text) => f.write_str(text),
        }
    }
}

fn take_while(s: &str, pred: impl Fn(char) -> bool) -> (&str, &str) {
    let end = s.find(|c: char| !pred(c)).unwrap_or(s.len());
    s.split_at(end)
}

/// Parses a quoted string at the start of `s`, returning the value and the rest.
///
/// Only `\"` and `\\` are unescaped. Any other backslash sequence (`\n`, `C:\temp`) is kept
/// as written.
fn parse_quoted(s: &str) -> Option<(String, &str)> {
    let mut chars = s.char_indices();
    if chars.next()?.1 != '"' {
        return None;
    }
    let mut value = String::new();
    let mut escaped = false;
    for (idx, c) in chars {
        if escaped {
            if c != '"' && c != '\\' {
                value.push('\\');
            }
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Some((value, &s[idx + 1..]));
        } else {
            value.push(c);
        }
    }
    // unterminated
    None
}

fn parse_number(s: &str) -> Option<(i64, &str)> {
    let sign_len = usize::from(s.starts_with('-'));
    let (digits, _) = take_while(&s[sign_len..], |c| c.is_ascii_digit());
    if digits.is_empty() {
        return None;
    }
    let end = sign_len + digits.len();
    let rest = &s[end..];
    // `123abc` is an expression, not a number
    if rest.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((s[..end].parse().ok()?, rest))
}

fn parse_define(line: &str) -> Option<Define> {
    let (indent, rest) = take_while(line, |c| c == ' ' || c == '\t');
    let rest = rest.strip_prefix(DEFINE)?;
    let (space, rest) = take_while(rest, |c| c == ' ' || c == '\t');
    if space.is_empty() {
        return None;
    }
    let (name, rest) = take_while(rest, |c| c.is_ascii_alphanumeric() || c == '_');
    if name.is_empty() {
        return None;
    }
    let (gap, rest) = take_while(rest, |c| c == ' ' || c == '\t');
    if gap.is_empty() {
        return None;
    }
    let (value, trail) = if rest.starts_with('"') {
        let (s, trail) = parse_quoted(rest)?;
        (Value::Str(s), trail)
    } else {
        let (n, trail) = parse_number(rest)?;
        (Value::Num(n), trail)
    };
    let raw = &rest[..rest.len() - trail.len()];

    Some(Define {
        lead: format!("{indent}{DEFINE}{space}"),
        name: name.to_owned(),
        gap: gap.to_owned(),
        value,
        raw: Some(raw.to_owned()),
        trail: trail.to_owned(),
    })
}

/// The parsed contents of a definitions file.
///
/// Reads look a name up wherever it is in the file. Writes replace a definition's value in
/// place; a definition that does not exist yet is appended at the end.
///
/// ```
/// use verstamp::Definitions;
///
/// let mut defs = Definitions::parse("// header\n#define PROJECT_VERSION \"1.2.3\"\n");
/// defs.set_text("PROJECT_VERSION", "1.3.0");
/// defs.set_number("PROJECT_VERSION_NUM", 10300);
/// assert_eq!(
///     "// header\n#define PROJECT_VERSION \"1.3.0\"\n#define PROJECT_VERSION_NUM 10300\n",
///     defs.to_string()
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Definitions {
    lines: Vec<Line>,
    trailing_newline: bool,
    /// Lines end in `\r\n`; appended definitions follow suit.
    crlf: bool,
}

impl Definitions {
    pub fn parse(text: &str) -> Self {
        let trailing_newline = text.ends_with('\n');
        let crlf = text.contains("\r\n");
        let body = text.strip_suffix('\n').unwrap_or(text);
        let lines = if text.is_empty() {
            Vec::new()
        } else {
            body.split('\n')
                .map(|line| match parse_define(line) {
                    Some(define) => Line::Define(define),
                    None => Line::Literal(line.to_owned()),
                })
                .collect()
        };
        Self {
            lines,
            trailing_newline,
            crlf,
        }
    }

    fn find(&self, name: &str) -> Option<&Define> {
        self.lines.iter().find_map(|line| match line {
            Line::Define(define) if define.name == name => Some(define),
            _ => None,
        })
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Define> {
        self.lines.iter_mut().find_map(|line| match line {
            Line::Define(define) if define.name == name => Some(define),
            _ => None,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.find(name).map(|define| &define.value)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(Value::text)
    }

    pub fn number(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::number)
    }

    /// Names of all simple definitions, in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            Line::Define(define) => Some(define.name.as_str()),
            Line::Literal(_) => None,
        })
    }

    /// Sets a string value. An existing numeric definition stays numeric if `value` is an
    /// integer.
    pub fn set_text(&mut self, name: &str, value: &str) {
        let new_value = match self.get(name) {
            Some(Value::Num(_)) => match value.trim().parse() {
                Ok(n) => Value::Num(n),
                Err(_) => Value::Str(value.to_owned()),
            },
            _ => Value::Str(value.to_owned()),
        };
        self.set(name, new_value);
    }

    /// Sets a numeric value. An existing string definition stays quoted.
    pub fn set_number(&mut self, name: &str, value: i64) {
        let new_value = match self.get(name) {
            Some(Value::Str(_)) => Value::Str(value.to_string()),
            _ => Value::Num(value),
        };
        self.set(name, new_value);
    }

    fn set(&mut self, name: &str, value: Value) {
        if let Some(define) = self.find_mut(name) {
            if define.value != value {
                define.value = value;
                define.raw = None;
            }
            return;
        }

        debug!(name, "appending missing definition");
        let eol = if self.crlf { "\r" } else { "" };
        if !self.trailing_newline {
            // the old last line now needs an ending of its own
            match self.lines.last_mut() {
                Some(Line::Define(define)) => define.trail.push_str(eol),
                Some(Line::Literal(text)) => text.push_str(eol),
                None => {}
            }
        }
        self.lines.push(Line::Define(Define {
            lead: format!("{DEFINE} "),
            name: name.to_owned(),
            gap: " ".to_owned(),
            value,
            raw: None,
            trail: eol.to_owned(),
        }));
        self.trailing_newline = true;
    }
}

impl Display for Definitions {
    /// Renders the file. Unchanged input renders back identically.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, line) in self.lines.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{line}")?;
        }
        if self.trailing_newline {
            f.write_str("\n")?;
        }
        Ok(())
    }
}

/// Where the definitions file lives. Operations never touch the filesystem directly, so tests
/// can swap in a [`MemoryFile`].
pub trait VersionStore {
    /// # Errors
    ///
    /// Returns [`FileError::NotFound`] if there is nothing to load.
    fn load(&self) -> Result<Definitions, FileError>;

    /// Replaces the stored file with `definitions`, all at once.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::Io`] if the file cannot be written.
    fn save(&self, definitions: &Definitions) -> Result<(), FileError>;
}

/// A definitions file on disk. Saving writes a temporary file next to it and renames it into
/// place, so readers see either the old or the new file, never a mix.
#[derive(Debug, Clone)]
pub struct VersionFile {
    path: PathBuf,
}

impl VersionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> FileError {
        FileError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl VersionStore for VersionFile {
    fn load(&self) -> Result<Definitions, FileError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Definitions::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FileError::NotFound {
                path: self.path.clone(),
            }),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn save(&self, definitions: &Definitions) -> Result<(), FileError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(definitions.to_string().as_bytes())
            .map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        info!(path = %self.path.display(), "wrote version file");
        Ok(())
    }
}

/// An in-memory [`VersionStore`].
#[derive(Debug, Default)]
pub struct MemoryFile {
    text: RefCell<Option<String>>,
}

impl MemoryFile {
    pub fn new(text: &str) -> Self {
        Self {
            text: RefCell::new(Some(text.to_owned())),
        }
    }

    pub fn text(&self) -> Option<String> {
        self.text.borrow().clone()
    }
}

impl VersionStore for MemoryFile {
    fn load(&self) -> Result<Definitions, FileError> {
        self.text
            .borrow()
            .as_deref()
            .map(Definitions::parse)
            .ok_or_else(|| FileError::NotFound {
                path: PathBuf::from("<memory>"),
            })
    }

    fn save(&self, definitions: &Definitions) -> Result<(), FileError> {
        *self.text.borrow_mut() = Some(definitions.to_string());
        Ok(())
    }
}
