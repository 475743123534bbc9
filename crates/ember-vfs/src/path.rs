//! Path canonicalization.
//!
//! Purely textual: no backend is consulted. Input may use either separator,
//! be relative, and contain `.`/`..` segments; the canonical form is
//! absolute, single-separator, and idempotent under [`normalize`].

use alloc::string::String;
use alloc::vec::Vec;

/// Canonicalize `raw` into an absolute path.
///
/// Splits on both `/` and `\`, drops empty and all-dot segments, and
/// resolves `..` against the segments retained so far. A `..` with nothing
/// left to pop is kept literally (shell-like escape above root rather than
/// an error). The result always starts with `/`; an empty result is `/`.
pub fn normalize(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for tok in raw.split(['/', '\\']) {
        if tok.is_empty() {
            continue;
        }
        if tok == ".." {
            match segments.last() {
                Some(&"..") | None => segments.push(".."),
                Some(_) => {
                    segments.pop();
                }
            }
        } else if tok.bytes().all(|b| b == b'.') {
            // "." and runs of dots are no-ops
        } else {
            segments.push(tok);
        }
    }
    if segments.is_empty() {
        return String::from("/");
    }
    let mut out = String::new();
    for seg in segments {
        out.push('/');
        out.push_str(seg);
    }
    out
}

/// Join `base` and `segments`, canonicalize, and strip the leading
/// separator (the form the scripting host expects back).
pub fn combine(base: &str, segments: &[&str]) -> String {
    let mut joined = String::from(base);
    for seg in segments {
        joined.push('/');
        joined.push_str(seg);
    }
    let fixed = normalize(&joined);
    String::from(fixed.strip_prefix('/').unwrap_or(&fixed))
}

/// Everything before the final separator; `""` when no separator remains.
pub fn parent(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// The final path segment.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
