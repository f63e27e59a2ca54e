//! Candidate-file filtering and scan scope.
//!
//! [`FileFilter`] decides which relative paths a consumer may pick up. The orphan
//! sweep uses the same filter, applied to the file a marker protects, so a consumer
//! never deletes markers belonging to files it would not consume.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use walkdir::WalkDir;

use crate::errors::ClaimError;
use crate::lock::DEFAULT_MARKER_SUFFIX;

/// Anything that can accept or reject a path relative to the consumer root.
pub trait PathFilter {
    fn accepts(&self, relative: &Path) -> bool;
}

impl<F> PathFilter for F
where
    F: Fn(&Path) -> bool,
{
    fn accepts(&self, relative: &Path) -> bool {
        self(relative)
    }
}

/// Outcome of evaluating a [`FileFilter`], with the rule that decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleDecision {
    Include,
    Hidden,
    LockFile,
    Excluded,
    NotIncluded,
}

/// Include/exclude rules. Exclusion always wins over inclusion.
///
/// Globs match the relative path, regexes and extensions match the file name.
/// Dot-files and files carrying the marker suffix are never accepted.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
    include_regex: Option<Regex>,
    exclude_regex: Option<Regex>,
    include_ext: Vec<String>,
    exclude_ext: Vec<String>,
    lock_suffix: String,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            include: None,
            exclude: None,
            include_regex: None,
            exclude_regex: None,
            include_ext: Vec::new(),
            exclude_ext: Vec::new(),
            lock_suffix: DEFAULT_MARKER_SUFFIX.to_string(),
        }
    }
}

impl FileFilter {
    /// Accepts every non-hidden, non-marker file.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_globs(
        mut self,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self, ClaimError> {
        self.include = build_globset(include)?;
        self.exclude = build_globset(exclude)?;
        Ok(self)
    }

    pub fn with_include_regex(mut self, pattern: &str) -> Result<Self, ClaimError> {
        self.include_regex = Some(build_regex(pattern)?);
        Ok(self)
    }

    pub fn with_exclude_regex(mut self, pattern: &str) -> Result<Self, ClaimError> {
        self.exclude_regex = Some(build_regex(pattern)?);
        Ok(self)
    }

    /// Extensions may be given with or without the leading dot; matching ignores case.
    pub fn with_extensions(mut self, include: &[String], exclude: &[String]) -> Self {
        self.include_ext = normalize_exts(include);
        self.exclude_ext = normalize_exts(exclude);
        self
    }

    pub fn with_lock_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.lock_suffix = suffix.into();
        self
    }

    pub fn evaluate(&self, relative: &Path) -> RuleDecision {
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if name.starts_with('.') {
            return RuleDecision::Hidden;
        }
        if !self.lock_suffix.is_empty() && name.ends_with(self.lock_suffix.as_str()) {
            return RuleDecision::LockFile;
        }

        let lower = name.to_ascii_lowercase();
        let ext_matches = |exts: &[String]| exts.iter().any(|e| lower.ends_with(e.as_str()));

        if self.exclude.as_ref().is_some_and(|g| g.is_match(relative))
            || self.exclude_regex.as_ref().is_some_and(|r| r.is_match(&name))
            || ext_matches(&self.exclude_ext)
        {
            return RuleDecision::Excluded;
        }
        if self.include.as_ref().is_some_and(|g| !g.is_match(relative))
            || self.include_regex.as_ref().is_some_and(|r| !r.is_match(&name))
            || (!self.include_ext.is_empty() && !ext_matches(&self.include_ext))
        {
            return RuleDecision::NotIncluded;
        }
        RuleDecision::Include
    }
}

impl PathFilter for FileFilter {
    fn accepts(&self, relative: &Path) -> bool {
        self.evaluate(relative) == RuleDecision::Include
    }
}

/// Where a consumer looks for files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanScope {
    pub root: PathBuf,
    pub recursive: bool,
    /// Maximum directory depth below the root; `None` means unlimited when recursive.
    pub max_depth: Option<usize>,
}

impl ScanScope {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
            max_depth: None,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Walk depth for entries below the root (files directly in the root are depth 1).
    pub fn walk_depth(&self) -> usize {
        if self.recursive {
            self.max_depth.unwrap_or(usize::MAX)
        } else {
            1
        }
    }

    /// Files under the root the filter accepts, sorted. Dot-directories are not entered.
    pub fn candidates(&self, filter: &dyn PathFilter) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(self.walk_depth())
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let relative = e.path().strip_prefix(&self.root).unwrap_or(e.path());
                filter.accepts(relative)
            })
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, ClaimError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| ClaimError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|source| ClaimError::InvalidGlob {
            pattern: patterns.join(","),
            source,
        })
}

fn build_regex(pattern: &str) -> Result<Regex, ClaimError> {
    Regex::new(pattern).map_err(|source| ClaimError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

fn normalize_exts(exts: &[String]) -> Vec<String> {
    exts.iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{e}"))
        .collect()
}
