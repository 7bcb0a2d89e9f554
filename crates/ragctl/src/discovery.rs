//! File discovery and pre-flight validation
//!
//! Everything here runs before a run is created. Any violation is a terminal
//! [`Error::Validation`], never a per-file outcome.

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::SecurityConfig;
use crate::error::{Error, Result};

/// Reject patterns that could escape the batch directory
pub fn validate_pattern_safe(pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(Error::validation("pattern must not be empty"));
    }
    if pattern.contains('\0') {
        return Err(Error::validation("pattern contains a NUL byte"));
    }
    if pattern.starts_with('/') || pattern.starts_with('\\') || Path::new(pattern).is_absolute() {
        return Err(Error::validation(format!(
            "pattern '{}' must be relative to the batch directory",
            pattern
        )));
    }
    if pattern.split(|c| c == '/' || c == '\\').any(|part| part == "..") {
        return Err(Error::validation(format!(
            "pattern '{}' must not contain '..'",
            pattern
        )));
    }
    Ok(())
}

/// Glob pattern compiled to a regex
///
/// `*` and `?` stay within one path component, `**` crosses components and
/// `[...]` (or `[!...]`) is a character class. Patterns without a `/` match
/// the file name; patterns with one match the path relative to the root.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    regex: Regex,
    match_path: bool,
}

impl GlobMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut out = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                }
                '*' => out.push_str("[^/]*"),
                '?' => out.push_str("[^/]"),
                '[' => {
                    let mut class = String::new();
                    let mut closed = false;
                    if chars.peek() == Some(&'!') {
                        chars.next();
                        class.push('^');
                    }
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        if c == '\\' || c == '[' {
                            class.push('\\');
                        }
                        class.push(c);
                    }
                    if !closed || class.is_empty() || class == "^" {
                        return Err(Error::validation(format!(
                            "pattern '{}' has an unterminated character class",
                            pattern
                        )));
                    }
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                }
                other => out.push_str(&regex::escape(&other.to_string())),
            }
        }
        out.push('$');

        let regex = Regex::new(&out)
            .map_err(|e| Error::validation(format!("invalid pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            regex,
            match_path: pattern.contains('/'),
        })
    }

    /// Whether `relative` (a path under the root) matches
    pub fn is_match(&self, relative: &Path) -> bool {
        if self.match_path {
            let joined = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            self.regex.is_match(&joined)
        } else {
            relative
                .file_name()
                .map(|name| self.regex.is_match(&name.to_string_lossy()))
                .unwrap_or(false)
        }
    }
}

/// Files under `root` matching `pattern`, sorted by path
///
/// Only the top level is searched unless `recursive` is set. Symbolic links
/// are reported as found (not followed) so that [`validate_files`] can decide.
pub fn discover_files(root: &Path, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    validate_pattern_safe(pattern)?;
    let matcher = GlobMatcher::new(pattern)?;
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        let file_type = entry.file_type();
        let is_candidate = file_type.is_file() || (file_type.is_symlink() && entry.path().is_file());
        if !is_candidate {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if matcher.is_match(relative) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    tracing::debug!(
        "Discovered {} files matching '{}' in {}",
        files.len(),
        pattern,
        root.display()
    );
    Ok(files)
}

/// Split files into those accepted by `is_supported` and the rest, keeping order
pub fn filter_supported_files<F>(files: Vec<PathBuf>, is_supported: F) -> (Vec<PathBuf>, Vec<PathBuf>)
where
    F: Fn(&Path) -> bool,
{
    files
        .into_iter()
        .filter(|path| !path.is_dir())
        .partition(|path| is_supported(path))
}

/// Apply the security limits to a discovered file set, returning its total size
pub fn validate_files(files: &[PathBuf], security: &SecurityConfig) -> Result<u64> {
    if files.len() > security.max_batch_files {
        return Err(Error::validation(format!(
            "batch of {} files exceeds the limit of {}",
            files.len(),
            security.max_batch_files
        )));
    }

    let mut total: u64 = 0;
    for path in files {
        let link = std::fs::symlink_metadata(path)?;
        if link.file_type().is_symlink() && !security.allow_symlinks {
            return Err(Error::validation(format!(
                "symbolic links are not allowed: {}",
                path.display()
            )));
        }

        let size = std::fs::metadata(path)?.len();
        if size > security.max_file_size {
            return Err(Error::validation(format!(
                "{} is {} bytes, above the per-file limit of {} bytes",
                path.display(),
                size,
                security.max_file_size
            )));
        }

        total = total.saturating_add(size);
        if total > security.max_total_size {
            return Err(Error::validation(format!(
                "batch exceeds the total size limit of {} bytes",
                security.max_total_size
            )));
        }
    }
    Ok(total)
}

/// The batch root must be an existing directory
pub fn validate_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::validation(format!("Directory not found: {}", path.display())));
    }
    if !path.is_dir() {
        return Err(Error::validation(format!("Not a directory: {}", path.display())));
    }
    Ok(())
}

/// An output location must not be an existing non-directory or contain `..`
pub fn validate_output_path(path: &Path) -> Result<()> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::validation(format!(
            "output path must not contain '..': {}",
            path.display()
        )));
    }
    if path.exists() && !path.is_dir() {
        return Err(Error::validation(format!(
            "output path exists and is not a directory: {}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("file1.txt"), "one").unwrap();
        fs::write(tmp.path().join("file2.txt"), "two").unwrap();
        fs::write(tmp.path().join("notes.md"), "# notes").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("file3.txt"), "three").unwrap();
        fs::write(tmp.path().join("sub").join("image.jpg"), [0xffu8, 0xd8]).unwrap();
        tmp
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_pattern_safety() {
        validate_pattern_safe("*.txt").unwrap();
        validate_pattern_safe("docs/**/*.md").unwrap();
        assert!(validate_pattern_safe("").is_err());
        assert!(validate_pattern_safe("../../*").is_err());
        assert!(validate_pattern_safe("docs/../*").is_err());
        assert!(validate_pattern_safe("/etc/*").is_err());
    }

    #[test]
    fn test_glob_translation() {
        let txt = GlobMatcher::new("*.txt").unwrap();
        assert!(txt.is_match(Path::new("a.txt")));
        assert!(txt.is_match(Path::new("sub/a.txt")));
        assert!(!txt.is_match(Path::new("a.txt.bak")));

        let single = GlobMatcher::new("file?.txt").unwrap();
        assert!(single.is_match(Path::new("file1.txt")));
        assert!(!single.is_match(Path::new("file10.txt")));

        let class = GlobMatcher::new("file[12].txt").unwrap();
        assert!(class.is_match(Path::new("file2.txt")));
        assert!(!class.is_match(Path::new("file3.txt")));

        let negated = GlobMatcher::new("file[!1].txt").unwrap();
        assert!(negated.is_match(Path::new("file2.txt")));
        assert!(!negated.is_match(Path::new("file1.txt")));

        let nested = GlobMatcher::new("sub/**/*.txt").unwrap();
        assert!(nested.is_match(Path::new("sub/file3.txt")));
        assert!(nested.is_match(Path::new("sub/deep/file4.txt")));
        assert!(!nested.is_match(Path::new("file1.txt")));

        let dots = GlobMatcher::new("a.b").unwrap();
        assert!(!dots.is_match(Path::new("axb")));

        assert!(GlobMatcher::new("file[12.txt").is_err());
    }

    #[test]
    fn test_discover_non_recursive() {
        let tmp = tree();
        let files = discover_files(tmp.path(), "*", false).unwrap();
        assert_eq!(names(&files), vec!["file1.txt", "file2.txt", "notes.md"]);
    }

    #[test]
    fn test_discover_recursive_with_pattern() {
        let tmp = tree();
        let files = discover_files(tmp.path(), "*.txt", true).unwrap();
        assert_eq!(names(&files), vec!["file1.txt", "file2.txt", "file3.txt"]);
    }

    #[test]
    fn test_discover_no_matches() {
        let tmp = tree();
        assert!(discover_files(tmp.path(), "*.pdf", true).unwrap().is_empty());
    }

    #[test]
    fn test_filter_supported() {
        let tmp = tree();
        let files = discover_files(tmp.path(), "*", true).unwrap();
        let (supported, unsupported) = filter_supported_files(files, |p| {
            p.extension().and_then(|e| e.to_str()) != Some("jpg")
        });
        assert_eq!(supported.len(), 4);
        assert_eq!(names(&unsupported), vec!["image.jpg"]);
    }

    #[test]
    fn test_validate_files_limits() {
        let tmp = tree();
        let files = discover_files(tmp.path(), "*.txt", true).unwrap();

        let total = validate_files(&files, &SecurityConfig::default()).unwrap();
        assert_eq!(total, 3 + 3 + 5);
        validate_files(&[], &SecurityConfig::default()).unwrap();

        let too_many = SecurityConfig {
            max_batch_files: 2,
            ..SecurityConfig::default()
        };
        assert!(validate_files(&files, &too_many).is_err());

        let too_big = SecurityConfig {
            max_file_size: 4,
            ..SecurityConfig::default()
        };
        assert!(validate_files(&files, &too_big).is_err());

        let small_total = SecurityConfig {
            max_total_size: 6,
            ..SecurityConfig::default()
        };
        assert!(matches!(validate_files(&files, &small_total), Err(Error::Validation(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_rejected_unless_allowed() {
        let tmp = tree();
        let link = tmp.path().join("link.txt");
        std::os::unix::fs::symlink(tmp.path().join("file1.txt"), &link).unwrap();

        let files = discover_files(tmp.path(), "link.txt", false).unwrap();
        assert_eq!(files, vec![link]);
        assert!(validate_files(&files, &SecurityConfig::default()).is_err());

        let allow = SecurityConfig {
            allow_symlinks: true,
            ..SecurityConfig::default()
        };
        validate_files(&files, &allow).unwrap();
    }

    #[test]
    fn test_directory_and_output_checks() {
        let tmp = tree();
        validate_directory_exists(tmp.path()).unwrap();
        assert!(validate_directory_exists(&tmp.path().join("missing")).is_err());
        assert!(validate_directory_exists(&tmp.path().join("file1.txt")).is_err());

        validate_output_path(&tmp.path().join("out")).unwrap();
        validate_output_path(&tmp.path().join("sub")).unwrap();
        assert!(validate_output_path(&tmp.path().join("file1.txt")).is_err());
        assert!(validate_output_path(Path::new("out/../../etc")).is_err());
    }
}
