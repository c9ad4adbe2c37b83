//! Reference index utilities
//!
//! Harvests reference tags out of a source tree with their provenance and
//! parses previously recorded index files. Identifiers for reports follow
//! the gap-filling `prefix_NNN` discipline: the lowest free number wins,
//! so deleting an entry reopens its slot.

use std::collections::HashSet;
use std::path::Path;

use trellis_core::error::Result;
use trellis_core::tags::{IndexedReference, Reference, parse_tag};
use trellis_scanner::{ScanOptions, Scanner};

/// Smallest `prefix_NNN` (1-based, zero-padded to three digits) not in
/// `existing`.
pub fn next_available_id(prefix: &str, existing: &HashSet<String>) -> String {
    let mut n = 1usize;
    loop {
        let candidate = format!("{prefix}_{n:03}");
        if !existing.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Scan `root` and return every reference tag found in its files, with
/// file and line provenance. Forces tag harvesting on regardless of the
/// caller's `include_comments`.
pub fn index_references(root: &Path, options: &ScanOptions) -> Result<Vec<IndexedReference>> {
    let scanner = Scanner::new();
    let options = ScanOptions {
        recursive: options.recursive,
        extensions: options.extensions.clone(),
        exclude: options.exclude.clone(),
        include_comments: true,
        verbose: options.verbose,
        on_progress: None,
        cancel: options.cancel.clone(),
    };
    let outcome = scanner.scan(root, &options)?;
    Ok(outcome.tags)
}

/// Parse one previously recorded tag line into an [`IndexedReference`].
/// Unparseable lines still yield a reference (with an empty type) so the
/// drift detector can report them as `unknown` instead of dropping them.
pub fn parse_index_line(raw: &str, file: &str, line: u32) -> IndexedReference {
    let raw = raw.trim();
    let reference = match parse_tag(raw) {
        Ok(reference) => reference,
        Err(e) => {
            tracing::debug!(tag = raw, "unparseable indexed tag: {e}");
            Reference::default()
        }
    };
    IndexedReference {
        reference,
        file: file.to_string(),
        index_line: line,
        original_tag: raw.to_string(),
    }
}

/// Parse a whole index blob, one tag per non-empty line.
pub fn parse_index(blob: &str, file: &str) -> Vec<IndexedReference> {
    blob.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_index_line(line, file, i as u32 + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_fill_takes_the_lowest_free_number() {
        let existing: HashSet<String> = ["clipboard_001", "clipboard_003"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(next_available_id("clipboard", &existing), "clipboard_002");
    }

    #[test]
    fn empty_set_starts_at_one() {
        assert_eq!(next_available_id("drift", &HashSet::new()), "drift_001");
    }

    #[test]
    fn contiguous_set_appends() {
        let existing: HashSet<String> = (1..=3).map(|n| format!("ref_{n:03}")).collect();
        assert_eq!(next_available_id("ref", &existing), "ref_004");
    }

    #[test]
    fn parse_index_keeps_unparseable_lines_as_unknown_material() {
        let parsed = parse_index("@Fn/a#b:3\n\nnot a tag\n", "refs.txt");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].reference.kind, "Fn");
        assert_eq!(parsed[0].index_line, 1);
        assert!(parsed[1].reference.kind.is_empty());
        assert_eq!(parsed[1].original_tag, "not a tag");
        assert_eq!(parsed[1].index_line, 3);
    }

    #[test]
    fn harvest_walks_the_tree() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("a.ts"),
            "// @Fn/a#alpha:2\nexport function alpha() {}\n",
        )
        .unwrap();
        let tags = index_references(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].file, "a.ts");
        assert_eq!(tags[0].reference.element.as_deref(), Some("alpha"));
    }
}
