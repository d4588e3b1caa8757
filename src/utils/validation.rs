use std::path::{Component, Path, PathBuf};

/// Longest stored filename we accept, in bytes, before the timestamp prefix.
pub const MAX_FILENAME_LEN: usize = 200;

const FALLBACK_FILENAME: &str = "upload";

/// Reduce a client-supplied filename to a single safe path component.
///
/// Directory parts are dropped, reserved characters become `_`, leading dots
/// are stripped so uploads never land as hidden files, and the result is
/// truncated on a UTF-8 boundary.
pub fn sanitize_filename(filename: &str) -> String {
    // Treat both separators as path separators regardless of platform
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload name: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c.is_whitespace()
                || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';' | '%' | '#')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');

    let sanitized = if sanitized.len() > MAX_FILENAME_LEN {
        let mut end = MAX_FILENAME_LEN;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        &sanitized[..end]
    } else {
        sanitized
    };

    if sanitized.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        sanitized.to_string()
    }
}

/// Join a request path onto `root`, refusing anything that could escape it.
///
/// Only plain relative components are accepted: no `..`, no root or prefix
/// components, no backslashes and no empty path.
pub fn safe_join(root: &Path, requested: &str) -> Option<PathBuf> {
    let requested = requested.trim_start_matches('/');
    if requested.is_empty() || requested.contains('\\') || requested.contains('\0') {
        return None;
    }

    let relative = Path::new(requested);
    let mut joined = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }

    if joined == root { None } else { Some(joined) }
}
