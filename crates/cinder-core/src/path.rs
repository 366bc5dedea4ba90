//! URI <-> path conversion and compile-command path resolution.
//!
//! Cinder stores file identities inside shards as `file://` URIs so that
//! persisted artifacts stay stable across machines that mount the same tree
//! at the same location. These helpers convert between URIs and absolute
//! paths without touching the filesystem.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum UriError {
    #[error("unsupported URI scheme in {0}")]
    UnsupportedScheme(String),

    #[error("malformed file URI {0}")]
    Malformed(String),
}

/// Renders an absolute path as a `file://` URI, percent-encoding everything
/// outside the unreserved set plus `/`.
pub fn path_to_file_uri(path: &Path) -> String {
    let mut out = String::from("file://");
    let text = path.to_string_lossy();
    if !text.starts_with('/') {
        // Windows drive paths need a leading slash in the URI form.
        out.push('/');
    }
    for &byte in text.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' | b':' => {
                out.push(byte as char)
            }
            b'\\' => out.push('/'),
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
    out
}

/// Parses a `file://` URI back into an absolute path.
///
/// A relative URI path is resolved against the directory containing
/// `hint_path`; dot segments are removed from the result. The URI authority
/// is ignored (only empty and `localhost` occur in practice).
pub fn file_uri_to_path(uri: &str, hint_path: &Path) -> Result<PathBuf, UriError> {
    let rest = uri
        .strip_prefix("file://")
        .ok_or_else(|| UriError::UnsupportedScheme(uri.to_string()))?;
    let rest = if rest.starts_with('/') {
        rest
    } else {
        let Some(slash) = rest.find('/') else {
            return Err(UriError::Malformed(uri.to_string()));
        };
        &rest[slash..]
    };

    let decoded = percent_decode(rest).ok_or_else(|| UriError::Malformed(uri.to_string()))?;
    let path = PathBuf::from(decoded);
    let path = if path.is_absolute() {
        path
    } else {
        hint_path.parent().unwrap_or_else(|| Path::new("/")).join(path)
    };
    Ok(remove_dot_segments(&path))
}

/// Resolves a compile command's file name to an absolute path.
///
/// The file name is either absolute or relative to the command's working
/// directory, which is not necessarily the process working directory.
pub fn absolute_main_path(directory: &Path, filename: &Path) -> PathBuf {
    if filename.is_absolute() {
        remove_dot_segments(filename)
    } else {
        remove_dot_segments(&directory.join(filename))
    }
}

/// Lexically removes `.` and `..` segments without consulting the filesystem.
pub fn remove_dot_segments(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // Popping past the root is a no-op, so `/a/../../b` normalizes
            // to `/b`.
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn percent_decode(text: &str) -> Option<String> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes();
    while let Some(byte) = bytes.next() {
        if byte == b'%' {
            let hi = bytes.next()?;
            let lo = bytes.next()?;
            let hi = (hi as char).to_digit(16)?;
            let lo = (lo as char).to_digit(16)?;
            out.push((hi * 16 + lo) as u8);
        } else {
            out.push(byte);
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_round_trip() {
        let path = Path::new("/src/dir with space/a.cpp");
        let uri = path_to_file_uri(path);
        assert_eq!(uri, "file:///src/dir%20with%20space/a.cpp");
        let back = file_uri_to_path(&uri, Path::new("/")).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn authority_is_ignored() {
        let resolved =
            file_uri_to_path("file://localhost/b.h", Path::new("/src/main.cpp")).expect("resolves");
        assert_eq!(resolved, Path::new("/b.h"));
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(
            file_uri_to_path("test:///a.cpp", Path::new("/")),
            Err(UriError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_truncated_escapes() {
        assert!(matches!(
            file_uri_to_path("file:///a%2", Path::new("/")),
            Err(UriError::Malformed(_))
        ));
    }

    #[test]
    fn main_path_joins_relative_filenames() {
        assert_eq!(
            absolute_main_path(Path::new("/build/sub"), Path::new("../src/./a.cpp")),
            PathBuf::from("/build/src/a.cpp")
        );
        assert_eq!(
            absolute_main_path(Path::new("/build"), Path::new("/abs/a.cpp")),
            PathBuf::from("/abs/a.cpp")
        );
    }

    #[test]
    fn dot_segments_never_escape_the_root() {
        assert_eq!(
            remove_dot_segments(Path::new("/a/../../b")),
            PathBuf::from("/b")
        );
    }
}
