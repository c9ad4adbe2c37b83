//! Deterministic source-tree discovery
//!
//! Produces the file list a scan will process, in sorted walk order, after
//! applying the extension filter and exclude globs. Exclude patterns match
//! the normalized forward-slash path relative to the scan root: `**` spans
//! segments, `*` stays within one, `?` matches a single character.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use trellis_core::error::{Error, Result};
use trellis_core::model::normalize_path;

use crate::language::SourceLanguage;

/// Excluded unless the caller overrides: dependency trees, build outputs,
/// and test files.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/node_modules/**",
    "**/dist/**",
    "**/build/**",
    "**/out/**",
    "**/coverage/**",
    "**/.git/**",
    "**/*.test.*",
    "**/*.spec.*",
    "**/__tests__/**",
];

/// The default extension filter.
pub const DEFAULT_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

/// One file selected for scanning.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub absolute: PathBuf,
    /// Normalized forward-slash path relative to the scan root.
    pub relative: String,
    pub language: SourceLanguage,
}

/// Compile exclude patterns, falling back to the defaults when none are
/// given. Invalid patterns are skipped with a warning rather than aborting
/// the scan.
pub fn build_exclude_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    let effective: Vec<String> = if patterns.is_empty() {
        DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
    } else {
        patterns.to_vec()
    };
    for pattern in &effective {
        match GlobBuilder::new(pattern).literal_separator(true).build() {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => tracing::warn!(pattern, "skipping invalid exclude pattern: {e}"),
        }
    }
    builder.build().unwrap_or_else(|e| {
        tracing::warn!("exclude set failed to compile: {e}");
        GlobSet::empty()
    })
}

/// Walk `root` and return the files to scan, sorted by relative path.
pub fn discover_files(
    root: &Path,
    extensions: &[String],
    excludes: &GlobSet,
    recursive: bool,
) -> Result<Vec<DiscoveredFile>> {
    if !root.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("scan root is not a directory: {}", root.display()),
        )));
    }

    let mut walker = WalkBuilder::new(root);
    walker
        .standard_filters(false)
        .hidden(true)
        .follow_links(false)
        .sort_by_file_path(|a, b| a.cmp(b));
    if !recursive {
        walker.max_depth(Some(1));
    }

    let mut files = Vec::new();
    for entry in walker.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("walk error: {e}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let absolute = entry.into_path();
        let Ok(stripped) = absolute.strip_prefix(root) else {
            continue;
        };
        let relative = normalize_path(&stripped.to_string_lossy());

        let extension = absolute
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !extensions.iter().any(|wanted| wanted == extension) {
            continue;
        }
        if excludes.is_match(&relative) {
            continue;
        }

        files.push(DiscoveredFile {
            language: SourceLanguage::from_path(&absolute),
            absolute,
            relative,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}
