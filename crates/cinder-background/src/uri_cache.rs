use std::collections::HashMap;
use std::path::PathBuf;

use cinder_core::path::file_uri_to_path;

/// Resolves repeated URI strings to absolute paths once per translation unit.
///
/// The cache is TU-scoped: the hint path is the TU's main file, and results
/// must not be shared across TUs. Failures are cached too, so a bad URI logs
/// once rather than once per record.
pub(crate) struct UriToPathCache {
    hint_path: PathBuf,
    cache: HashMap<String, Option<PathBuf>>,
}

impl UriToPathCache {
    pub(crate) fn new(hint_path: PathBuf) -> Self {
        Self {
            hint_path,
            cache: HashMap::new(),
        }
    }

    /// The absolute path for `uri`, or `None` for unparseable URIs (the
    /// caller skips the record).
    pub(crate) fn resolve(&mut self, uri: &str) -> Option<PathBuf> {
        if let Some(cached) = self.cache.get(uri) {
            return cached.clone();
        }
        let resolved = match file_uri_to_path(uri, &self.hint_path) {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::warn!(
                    target = "cinder.background",
                    uri,
                    error = %err,
                    "skipping records with unresolvable URI"
                );
                None
            }
        };
        self.cache.insert(uri.to_string(), resolved.clone());
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn resolution_is_cached() {
        let mut cache = UriToPathCache::new(PathBuf::from("/src/a.cpp"));
        assert_eq!(
            cache.resolve("file:///src/h.h"),
            Some(PathBuf::from("/src/h.h"))
        );
        assert_eq!(
            cache.resolve("file:///src/h.h"),
            Some(PathBuf::from("/src/h.h"))
        );
        assert_eq!(cache.cache.len(), 1);
    }

    #[test]
    fn failures_are_cached_as_unresolvable() {
        let mut cache = UriToPathCache::new(PathBuf::from("/src/a.cpp"));
        assert_eq!(cache.resolve("http://not-a-file"), None);
        assert_eq!(cache.resolve("http://not-a-file"), None);
        assert_eq!(cache.cache.len(), 1);
    }

    #[test]
    fn hint_path_is_used_for_dot_segments() {
        let mut cache = UriToPathCache::new(PathBuf::from("/src/sub/a.cpp"));
        assert_eq!(
            cache.resolve("file:///src/sub/../h.h").as_deref(),
            Some(Path::new("/src/h.h"))
        );
    }
}
