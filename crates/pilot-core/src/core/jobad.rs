//! Job and machine description documents.
//!
//! The scheduler hands the pilot flat `Key = Value` documents (ClassAds).
//! The engine only ever asks three questions of them, captured by
//! [`JobDescription`]; [`ClassAdFile`] answers them from a file on disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::tooling::errors::LaunchError;

/// Attribute listing the environment the job declares for itself.
pub const ENVIRONMENT_ATTR: &str = "Environment";

pub trait JobDescription {
    /// Value of `key`, or `default` when the key is missing or empty.
    ///
    /// # Errors
    /// Fails when there is no document and no default was supplied.
    fn get_string(&self, key: &str, default: Option<&str>) -> Result<String, LaunchError>;

    /// `true` for case-insensitive `true` or any non-zero integer, `default`
    /// for missing, empty or `undefined`, `false` otherwise.
    fn get_bool(&self, key: &str, default: bool) -> bool;

    /// Names of the variables the job declares in its environment block.
    fn declared_env_names(&self) -> Vec<String>;
}

/// Where a description document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAdSource {
    None,
    File(PathBuf),
}

impl JobAdSource {
    #[must_use]
    pub fn from_option(path: Option<&Path>) -> Self {
        match path {
            Some(path) => JobAdSource::File(path.to_path_buf()),
            None => JobAdSource::None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassAdFile {
    attributes: Vec<(String, String)>,
    present: bool,
}

impl ClassAdFile {
    /// Loads the document behind `source`. A missing file behaves like
    /// [`JobAdSource::None`].
    #[must_use]
    pub fn open(source: &JobAdSource) -> Self {
        match source {
            JobAdSource::None => Self::default(),
            JobAdSource::File(path) => match fs::read_to_string(path) {
                Ok(contents) => Self::parse(&contents),
                Err(err) => {
                    debug!(%err, path = %path.display(), "job description unreadable");
                    Self::default()
                }
            },
        }
    }

    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let attributes = contents
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                let key = key.trim();
                if key.is_empty() || key.contains(char::is_whitespace) {
                    return None;
                }
                Some((key.to_string(), unquote(value.trim()).to_string()))
            })
            .collect();
        Self {
            attributes,
            present: true,
        }
    }

    fn raw(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}

impl JobDescription for ClassAdFile {
    fn get_string(&self, key: &str, default: Option<&str>) -> Result<String, LaunchError> {
        if !self.present && default.is_none() {
            return Err(LaunchError::JobDescription {
                message: format!("no description document to read {key} from"),
            });
        }
        match self.raw(key).filter(|value| !value.is_empty()) {
            Some(value) => Ok(value.to_string()),
            None => default
                .map(str::to_string)
                .ok_or_else(|| LaunchError::NotFound {
                    what: format!("attribute {key}"),
                }),
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.raw(key).map(str::trim) {
            None | Some("") => default,
            Some(value) if value.eq_ignore_ascii_case("undefined") => default,
            Some(value) if value.eq_ignore_ascii_case("true") => true,
            Some(value) => value.parse::<i64>().is_ok_and(|n| n != 0),
        }
    }

    fn declared_env_names(&self) -> Vec<String> {
        self.raw(ENVIRONMENT_ATTR)
            .map(parse_declared_env_names)
            .unwrap_or_default()
    }
}

/// Extracts variable names from a declared-environment block such as
/// `FOO=1 BAR='two words' BAZ=x\ y`.
///
/// Escaped whitespace is removed before tokenizing so it never splits a
/// value; tokens without `=` or with an invalid name are skipped.
#[must_use]
pub fn parse_declared_env_names(block: &str) -> Vec<String> {
    let stripped = block.replace("\\ ", "").replace("\\\t", "");
    let mut names = Vec::new();
    for token in stripped.split_whitespace() {
        let Some((name, _)) = token.split_once('=') else {
            continue;
        };
        let name = name.trim_start_matches(['\'', '"']);
        if is_env_name(name) && !names.iter().any(|seen| seen == name) {
            names.push(name.to_string());
        }
    }
    names
}

pub(crate) fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
