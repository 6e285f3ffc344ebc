//! Path validation — filesystem sandboxing to the project root.
//!
//! Every path a tool touches passes through here first. Validation is
//! all-or-nothing: a rejection raises a `PolicyError` naming the rule
//! that fired, and nothing is partially applied.

use std::path::{Component, Path, PathBuf};

use toolforge_core::error::PolicyError;
use toolforge_core::Purpose;

/// The kind of filesystem access being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
        }
    }
}

/// Directory names that are never traversed, whatever the access kind.
const DENIED_SEGMENTS: &[&str] = &[".git", "node_modules", "target"];

/// Relative prefixes readable by any purpose.
const READ_PREFIXES: &[&str] = &["src", "data", "logs", "notes"];

/// Exact relative files readable by any purpose.
const READ_FILES: &[&str] = &["README.md", "Cargo.toml"];

/// Relative prefixes writable by purpose `dev`.
const WRITE_PREFIXES_DEV: &[&str] = &["data/outputs", "src"];

/// Relative prefixes writable by every other purpose.
const WRITE_PREFIXES: &[&str] = &["data/outputs"];

/// Validate a user-supplied path for the given access kind and purpose.
///
/// Returns the resolved absolute path under `root` on success.
pub fn validate_path(
    root: &Path,
    input: &str,
    access: Access,
    purpose: Purpose,
) -> Result<PathBuf, PolicyError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(PolicyError::EmptyPath);
    }

    // Normalize separators so Windows-style input gets the same treatment.
    let normalized = trimmed.replace('\\', "/");

    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(PolicyError::AbsolutePath {
            path: input.to_string(),
        });
    }

    // Resolve `.` and `..` lexically; any traversal above the root is an
    // escape regardless of what the filesystem would do with it.
    let mut resolved_rel: Vec<String> = Vec::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved_rel.pop().is_none() {
                    return Err(PolicyError::Traversal {
                        path: input.to_string(),
                    });
                }
            }
            Component::Normal(seg) => {
                let seg = seg.to_string_lossy().to_string();
                if DENIED_SEGMENTS.iter().any(|d| d.eq_ignore_ascii_case(&seg)) {
                    return Err(PolicyError::DeniedSegment {
                        path: input.to_string(),
                        segment: seg,
                    });
                }
                resolved_rel.push(seg);
            }
            _ => {
                return Err(PolicyError::AbsolutePath {
                    path: input.to_string(),
                });
            }
        }
    }

    if resolved_rel.is_empty() {
        return Err(PolicyError::EmptyPath);
    }

    let base_name = resolved_rel.last().map(String::as_str).unwrap_or("");
    if is_secret_holder(base_name) {
        return Err(PolicyError::DeniedFile {
            path: input.to_string(),
            file: base_name.to_string(),
        });
    }

    let rel = resolved_rel.join("/");
    match access {
        Access::Read => {
            let under_prefix = READ_PREFIXES
                .iter()
                .any(|p| rel == *p || rel.starts_with(&format!("{p}/")));
            let exact_file = READ_FILES.iter().any(|f| rel == *f);
            if !under_prefix && !exact_file {
                return Err(PolicyError::PrefixNotAllowed {
                    path: input.to_string(),
                    access: access.as_str().to_string(),
                });
            }
        }
        Access::Write => {
            let prefixes = if purpose == Purpose::Dev {
                WRITE_PREFIXES_DEV
            } else {
                WRITE_PREFIXES
            };
            let allowed = prefixes
                .iter()
                .any(|p| rel == *p || rel.starts_with(&format!("{p}/")));
            if !allowed {
                return Err(PolicyError::PrefixNotAllowed {
                    path: input.to_string(),
                    access: access.as_str().to_string(),
                });
            }
        }
    }

    let absolute = root.join(&rel);

    // An existing symlink target is rejected for both kinds of access;
    // symlink_metadata does not follow the link itself.
    if let Ok(meta) = std::fs::symlink_metadata(&absolute)
        && meta.file_type().is_symlink()
    {
        return Err(PolicyError::Symlink {
            path: input.to_string(),
        });
    }

    Ok(absolute)
}

/// Dotenv-style secret-holder filenames: `.env` and any `.env.*` variant.
fn is_secret_holder(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    lower == ".env" || lower.starts_with(".env.")
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}
