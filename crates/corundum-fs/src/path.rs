//! Path parsing and compounding for the VFS layer.
//!
//! No `.`/`..` resolution happens here — callers that need it do so before
//! calling into the VFS. This module only normalizes slashes and joins a
//! base path with an extension.

/// Maximum length, in bytes, of a path this crate will manipulate.
pub const MAX_PATH: usize = 256;

/// Split a path into its components, filtering empty segments.
///
/// Leading and trailing slashes are ignored. Multiple consecutive slashes
/// are treated as a single separator.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Returns `true` if `path` starts with `/`.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Reports whether `path` is in canonical form: absolute, no `//`, and no
/// trailing `/` unless the whole path is the root `/`.
pub fn is_canonical(path: &str) -> bool {
    if !is_absolute(path) {
        return false;
    }
    if path == "/" {
        return true;
    }
    if path.ends_with('/') {
        return false;
    }
    !path.as_bytes().windows(2).any(|w| w == b"//")
}

/// Finds the longest mount point that is a prefix of `path`.
///
/// Mount points are compared as path components (`/dev` matches `/dev/null`
/// but not `/device`); the root mount `/` always matches.
pub fn longest_prefix_match<'a>(
    path: &str,
    mount_points: impl Iterator<Item = &'a str>,
) -> Option<(&'a str, usize)> {
    let mut best: Option<&str> = None;

    for mp in mount_points {
        let matches = mp == "/"
            || path == mp || path.starts_with(mp) && path.as_bytes().get(mp.len()) == Some(&b'/');

        if matches && best.is_none_or(|b| mp.len() > b.len()) {
            best = Some(mp);
        }
    }

    best.map(|mp| (mp, mp.len()))
}

/// Joins `base` and `ext` into `out`, returning the number of bytes written.
///
/// If `ext` is itself absolute, it replaces `base` entirely (matching how
/// `open` treats an absolute path regardless of the process CWD). Runs of
/// `/` are collapsed and a single trailing `/` is stripped unless the
/// result is exactly `/`. Returns `None` if `out` is too small to hold the
/// normalized result — callers treat that as `String_Too_Long`.
pub fn compound_path(base: &str, ext: &str, out: &mut [u8]) -> Option<usize> {
    let effective: &str = if is_absolute(ext) { ext } else { base };
    let joined_ext = if is_absolute(ext) { "" } else { ext };

    let mut len = 0usize;
    let mut last_was_slash = false;

    let mut push = |byte: u8, len: &mut usize| -> bool {
        if *len >= out.len() {
            return false;
        }
        out[*len] = byte;
        *len += 1;
        true
    };

    if !push(b'/', &mut len) {
        return None;
    }
    last_was_slash = true;

    for part in effective
        .split('/')
        .filter(|s| !s.is_empty())
        .chain(joined_ext.split('/').filter(|s| !s.is_empty()))
    {
        if !last_was_slash {
            if !push(b'/', &mut len) {
                return None;
            }
        }
        for b in part.bytes() {
            if !push(b, &mut len) {
                return None;
            }
        }
        last_was_slash = false;
    }

    if len > 1 && out[len - 1] == b'/' {
        len -= 1;
    }

    Some(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(base: &str, ext: &str) -> alloc::string::String {
        let mut buf = [0u8; MAX_PATH];
        let len = compound_path(base, ext, &mut buf).expect("fits");
        core::str::from_utf8(&buf[..len]).unwrap().into()
    }

    extern crate alloc;

    #[test]
    fn joins_relative_extension() {
        assert_eq!(joined("/usr", "bin"), "/usr/bin");
    }

    #[test]
    fn absolute_extension_replaces_base() {
        assert_eq!(joined("/usr", "/etc/passwd"), "/etc/passwd");
    }

    #[test]
    fn collapses_duplicate_slashes_in_base() {
        assert_eq!(joined("/usr//local", "bin"), "/usr/local/bin");
    }

    #[test]
    fn strips_single_trailing_slash() {
        assert_eq!(joined("/usr/", ""), "/usr");
    }

    #[test]
    fn root_alone_keeps_slash() {
        assert_eq!(joined("/", ""), "/");
    }

    #[test]
    fn returns_none_when_buffer_too_small() {
        let mut buf = [0u8; 4];
        assert_eq!(compound_path("/usr", "local", &mut buf), None);
    }

    #[test]
    fn is_canonical_accepts_root() {
        assert!(is_canonical("/"));
    }

    #[test]
    fn is_canonical_rejects_relative() {
        assert!(!is_canonical("usr/bin"));
    }

    #[test]
    fn is_canonical_rejects_double_slash() {
        assert!(!is_canonical("/usr//bin"));
    }

    #[test]
    fn is_canonical_rejects_trailing_slash() {
        assert!(!is_canonical("/usr/"));
    }

    #[test]
    fn components_filters_empty_segments() {
        let parts: alloc::vec::Vec<&str> = components("/usr//bin/").collect();
        assert_eq!(parts, ["usr", "bin"]);
    }

    #[test]
    fn longest_prefix_matches_deepest_mount() {
        let mounts = ["/", "/mnt", "/mnt/data"];
        let best = longest_prefix_match("/mnt/data/file", mounts.into_iter());
        assert_eq!(best, Some(("/mnt/data", 9)));
    }

    #[test]
    fn longest_prefix_falls_back_to_root() {
        let mounts = ["/", "/mnt"];
        let best = longest_prefix_match("/etc/passwd", mounts.into_iter());
        assert_eq!(best, Some(("/", 1)));
    }

    #[test]
    fn longest_prefix_none_without_root_mount() {
        let mounts = ["/mnt"];
        let best = longest_prefix_match("/etc/passwd", mounts.into_iter());
        assert_eq!(best, None);
    }
}
