//! Resolves one set of upload parameters into the concrete local paths to upload.
//!
//! Patterns are wildcard patterns unless `regexp` is set. In a wildcard pattern `*` matches any
//! run of characters and parentheses mark groups whose matches replace `{1}`, `{2}`, ... in the
//! target. A target ending with `/` is a directory: with `flat` each file lands directly inside
//! it, otherwise its path relative to the walk root is kept.

use std::path::{Path, PathBuf};

use artifact_upload_core::upload_params::UploadParams;
use regex::{Captures, Regex};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Characters that end the literal directory prefix of a wildcard pattern.
const WILDCARD_SPECIALS: &[char] = &['*', '(', ')'];
/// Characters that end the literal directory prefix of a regular-expression pattern.
const REGEXP_SPECIALS: &[char] = &[
    '.', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|', '^', '$', '\\',
];

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateKind {
    File,
    /// An empty directory, created as a folder in the repository.
    EmptyDir,
    /// A symlink uploaded as a reference to `dest` rather than its content.
    Symlink { dest: PathBuf },
    /// A selected path that could not be read while walking; it fails on upload.
    Unreadable { reason: String },
}

/// A single local path paired with the repository path it uploads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    pub local_path: PathBuf,
    pub target_path: String,
    pub kind: CandidateKind,
}

/// Lists everything `params` selects, in walk order.
pub fn collect_candidates(params: &UploadParams) -> Result<Vec<UploadCandidate>, CollectError> {
    let mut pattern = params.common.pattern.replace('\\', "/");
    if !params.regexp && pattern.ends_with('/') {
        pattern.push('*');
    }

    let matcher = if params.regexp {
        compile(&pattern, &format!("^{pattern}$"))?
    } else {
        compile(&pattern, &wildcard_to_regex(&pattern, params.recursive))?
    };
    let exclusions = params
        .common
        .exclusions
        .iter()
        .map(|exclusion| compile(exclusion, &wildcard_to_regex(exclusion, true)))
        .collect::<Result<Vec<_>, _>>()?;

    let root = walk_root(&pattern, params.regexp);
    if !root.exists() {
        debug!(root = %root.display(), "Walk root does not exist, nothing to upload");
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(&root)
        .min_depth(1)
        .follow_links(!params.symlink)
        .sort_by_file_name();
    if !params.recursive {
        walker = walker.max_depth(literal_depth(&pattern, &root, params.regexp));
    }

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let unreadable = unreadable_candidate(params, &matcher, &exclusions, &root, &e);
                if let Some(candidate) = unreadable {
                    warn!(
                        path = %candidate.local_path.display(),
                        error = %e,
                        "Selected path is unreadable"
                    );
                    candidates.push(candidate);
                } else {
                    debug!(error = %e, "Skipping unreadable path outside the pattern");
                }
                continue;
            }
        };
        let path = entry.path();
        let path_str = display_path(path);
        let Some(captures) = matcher.captures(&path_str) else {
            continue;
        };
        if exclusions.iter().any(|exclusion| exclusion.is_match(&path_str)) {
            debug!(path = %path_str, "Excluded from upload");
            continue;
        }

        let file_type = entry.file_type();
        let kind = if file_type.is_symlink() && params.symlink {
            match std::fs::read_link(path) {
                Ok(dest) => CandidateKind::Symlink { dest },
                Err(e) => CandidateKind::Unreadable {
                    reason: format!("failed to read symlink: {e}"),
                },
            }
        } else if file_type.is_dir() {
            if !params.include_dirs || !is_empty_dir(path) {
                continue;
            }
            CandidateKind::EmptyDir
        } else {
            CandidateKind::File
        };

        let relative = path.strip_prefix(&root).unwrap_or(path);
        let mut target_path = target_path(params, &captures, &display_path(relative), path);
        if kind == CandidateKind::EmptyDir && !target_path.ends_with('/') {
            target_path.push('/');
        }
        candidates.push(UploadCandidate {
            local_path: path.to_path_buf(),
            target_path,
            kind,
        });
    }
    Ok(candidates)
}

/// Turns a walk error on a selected path into a candidate that fails on upload.
fn unreadable_candidate(
    params: &UploadParams,
    matcher: &Regex,
    exclusions: &[Regex],
    root: &Path,
    error: &walkdir::Error,
) -> Option<UploadCandidate> {
    let path = error.path()?;
    let path_str = display_path(path);
    let captures = matcher.captures(&path_str)?;
    if exclusions.iter().any(|exclusion| exclusion.is_match(&path_str)) {
        return None;
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    Some(UploadCandidate {
        local_path: path.to_path_buf(),
        target_path: target_path(params, &captures, &display_path(relative), path),
        kind: CandidateKind::Unreadable {
            reason: error.to_string(),
        },
    })
}

fn compile(pattern: &str, regex: &str) -> Result<Regex, CollectError> {
    Regex::new(regex).map_err(|source| CollectError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Translates a wildcard pattern into an anchored regular expression.
pub fn wildcard_to_regex(pattern: &str, cross_dirs: bool) -> String {
    let star = if cross_dirs { ".*" } else { "[^/]*" };
    let mut regex = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(star),
            '(' | ')' => regex.push(c),
            _ => regex.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    regex.push('$');
    regex
}

/// The deepest directory named literally by the pattern.
fn walk_root(pattern: &str, regexp: bool) -> PathBuf {
    let specials = if regexp { REGEXP_SPECIALS } else { WILDCARD_SPECIALS };
    let literal = match pattern.find(specials) {
        Some(index) => &pattern[..index],
        None => pattern,
    };
    match literal.rfind('/') {
        Some(0) => PathBuf::from("/"),
        Some(index) => PathBuf::from(&literal[..index]),
        None => PathBuf::from("."),
    }
}

/// How many path segments below the walk root a non-recursive pattern can reach.
fn literal_depth(pattern: &str, root: &Path, regexp: bool) -> usize {
    if regexp {
        return 1;
    }
    let root = display_path(root);
    let remainder = if root == "." {
        pattern
    } else {
        pattern
            .strip_prefix(root.as_str())
            .unwrap_or(pattern)
            .trim_start_matches('/')
    };
    remainder.matches('/').count() + 1
}

fn display_path(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    match s.strip_prefix("./") {
        Some(stripped) => stripped.to_string(),
        None => s,
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

fn target_path(params: &UploadParams, captures: &Captures<'_>, relative: &str, path: &Path) -> String {
    let mut target = params.common.target.clone();
    for index in 1..captures.len() {
        let value = captures.get(index).map_or("", |m| m.as_str());
        target = target.replace(&format!("{{{index}}}"), value);
    }
    if !target.ends_with('/') {
        return target;
    }
    if params.flat {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        target.push_str(&name);
    } else {
        target.push_str(relative);
    }
    target
}
