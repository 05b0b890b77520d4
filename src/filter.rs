//! Include/exclude glob filtering (§4.3 "Filter semantics").
//!
//! A path is included iff it does not match any exclude glob (matched on
//! basename, full relative path, or a path-separator-normalized form), AND
//! either no include globs are given or it matches at least one. Directory
//! excludes prune traversal, not just leaves.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

pub struct Filter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl Filter {
    pub fn new(include_patterns: &[String], exclude_patterns: &[String]) -> Self {
        let include = if include_patterns.is_empty() {
            None
        } else {
            Some(build_set(include_patterns))
        };
        let exclude = build_set(exclude_patterns);
        Self { include, exclude }
    }

    /// `rel` is the path relative to the task's source, using `/` separators.
    pub fn is_included(&self, rel: &Path, is_directory: bool) -> bool {
        if self.matches_exclude(rel) {
            return false;
        }
        if is_directory {
            // Directory excludes prune traversal; inclusion globs apply to
            // files, so an included directory is never excluded purely for
            // lacking a file-shaped include match.
            return true;
        }
        match &self.include {
            None => true,
            Some(set) => self.matches_any(set, rel),
        }
    }

    fn matches_exclude(&self, rel: &Path) -> bool {
        self.matches_any(&self.exclude, rel)
    }

    fn matches_any(&self, set: &GlobSet, rel: &Path) -> bool {
        let rel_str = normalize(rel);
        if set.is_match(&rel_str) {
            return true;
        }
        if let Some(name) = rel.file_name() {
            if set.is_match(name.to_string_lossy().as_ref()) {
                return true;
            }
        }
        // Also check each ancestor component path so a directory-level
        // exclude (e.g. "node_modules") prunes everything beneath it even
        // when matched only against a prefix of `rel`.
        for ancestor in rel.ancestors() {
            if ancestor == Path::new("") || ancestor == rel {
                continue;
            }
            if set.is_match(normalize(ancestor)) {
                return true;
            }
        }
        false
    }
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn build_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        } else {
            log::warn!(target: "replicator::filter", "ignoring invalid glob pattern: {pattern}");
        }
    }
    builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn excludes_by_basename() {
        let filter = Filter::new(&[], &["*.tmp".to_string()]);
        assert!(!filter.is_included(&PathBuf::from("a/b/file.tmp"), false));
        assert!(filter.is_included(&PathBuf::from("a/b/file.txt"), false));
    }

    #[test]
    fn includes_only_matching_when_include_list_given() {
        let filter = Filter::new(&["*.txt".to_string()], &[]);
        assert!(filter.is_included(&PathBuf::from("a.txt"), false));
        assert!(!filter.is_included(&PathBuf::from("a.png"), false));
    }

    #[test]
    fn directory_exclude_prunes_descendants() {
        let filter = Filter::new(&[], &["node_modules".to_string()]);
        assert!(!filter.is_included(&PathBuf::from("node_modules/pkg/index.js"), false));
    }

    #[test]
    fn no_include_globs_means_everything_included() {
        let filter = Filter::new(&[], &[]);
        assert!(filter.is_included(&PathBuf::from("anything/at/all.bin"), false));
    }
}
