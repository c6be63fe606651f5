use crate::error::{RomVfsError, RomVfsResult};
use crate::util::fold_ascii;
use regex::Regex;

/// Collapses a POSIX-style path against a working directory. Both `/` and
/// `\` separate segments; `.` drops out and `..` pops (a no-op at root).
/// The result is absolute, `/`-separated and has no trailing slash.
pub fn normalize(path: &str, cwd: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    let absolute = path.starts_with('/') || path.starts_with('\\');
    if !absolute {
        for segment in cwd.split(['/', '\\']) {
            if !segment.is_empty() {
                segments.push(segment);
            }
        }
    }

    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Segments of a normalized path; empty for the root.
pub fn segments(normalized: &str) -> Vec<&str> {
    normalized.split('/').filter(|s| !s.is_empty()).collect()
}

pub fn file_name(normalized: &str) -> &str {
    normalized.rsplit('/').next().unwrap_or("")
}

pub fn parent(normalized: &str) -> String {
    match normalized.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => normalized[..index].to_string(),
    }
}

pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Case-insensitive key for blacklist and de-duplication maps.
pub fn fold_key(normalized: &str) -> String {
    fold_ascii(normalized)
}

/// Compiles a `*`/`?` search pattern into a regex anchored to the whole
/// file name, matched case-insensitively.
pub fn compile_pattern(pattern: &str) -> RomVfsResult<Regex> {
    let mut expression = String::with_capacity(pattern.len() * 2 + 6);
    expression.push_str("(?i)^");
    for c in pattern.chars() {
        match c {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    Regex::new(&expression)
        .map_err(|e| RomVfsError::NotSupported(format!("bad search pattern {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_dots() {
        assert_eq!(normalize("/a/./b/../c", "/"), "/a/c");
        assert_eq!(normalize("..", "/"), "/");
        assert_eq!(normalize("/", "/"), "/");
        assert_eq!(normalize("a\\b", "/RomFS"), "/RomFS/a/b");
        assert_eq!(normalize("b.txt", "/ExeFS"), "/ExeFS/b.txt");
        assert_eq!(normalize("/../../x", "/deep/dir"), "/x");
    }

    #[test]
    fn parent_and_name_split() {
        assert_eq!(file_name("/RomFS/a/b.txt"), "b.txt");
        assert_eq!(parent("/RomFS/a/b.txt"), "/RomFS/a");
        assert_eq!(parent("/RomFS"), "/");
        assert_eq!(join("/", "RomFS"), "/RomFS");
        assert_eq!(join("/RomFS", "a"), "/RomFS/a");
    }

    #[test]
    fn patterns_anchor_to_the_full_name() {
        let pattern = compile_pattern("*.bin").unwrap();
        assert!(pattern.is_match("code.BIN"));
        assert!(!pattern.is_match("code.bina"));

        let single = compile_pattern("file?.txt").unwrap();
        assert!(single.is_match("file1.txt"));
        assert!(!single.is_match("file12.txt"));

        let literal = compile_pattern("a+b.bin").unwrap();
        assert!(literal.is_match("A+B.bin"));
        assert!(!literal.is_match("aab.bin"));
    }
}
