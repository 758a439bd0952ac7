/// Compute the destination-relative directory for an event that fired in `event_dir`.
///
/// Every configured root is compared against `event_dir` by absolute byte index,
/// from the end of `event_dir` back to index 1. A position counts as a divergence when
/// the root is too short to have a byte there, or when the bytes differ (separators in
/// `event_dir` never count as a difference). The suffix starts right after the deepest
/// divergence found against any root, so sibling roots like `/a/s/d/f` and `/a/s/d/e`
/// keep their distinguishing last segment while a lone root collapses to `/`.
///
/// The result is always rooted and cleaned: `resolve_suffix(&["/a/s/d/f"], "/a/s/d/f/g")`
/// is `"/g"`.
pub fn resolve_suffix<S: AsRef<str>>(roots: &[S], event_dir: &str) -> String {
    let dir = event_dir.as_bytes();
    if dir.is_empty() {
        return "/".to_owned();
    }

    let mut low = dir.len() - 1;
    for root in roots {
        let root = root.as_ref().as_bytes();
        for i in (1..dir.len()).rev() {
            if i >= root.len() {
                low = low.min(i - 1);
                continue;
            }
            if dir[i] == b'/' {
                continue;
            }
            if dir[i] != root[i] {
                low = low.min(i - 1);
            }
        }
    }

    // A divergence inside a multi-byte character must not split it.
    let mut start = low + 1;
    while !event_dir.is_char_boundary(start) {
        start -= 1;
    }

    clean_rooted(&format!("/{}/", &event_dir[start..]))
}

/// Lexically clean a rooted path: collapse repeated separators, drop `.`, apply `..`
/// (never above the root) and strip the trailing separator.
pub fn clean_rooted(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}
