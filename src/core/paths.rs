//! Shared path manipulation utilities.

use std::env;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};

/// Resolve a path to an absolute, normalized path.
///
/// Existing paths are canonicalized. Missing ones are made absolute relative
/// to CWD and `..`/`.` components are resolved syntactically, so the error
/// reported for a bad walk root still names a readable absolute path.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

/// Reduce an arbitrary label to `[A-Za-z0-9_-]` so it can be embedded in a
/// file name. Other characters become `_`; an empty result becomes `unnamed`.
pub fn sanitize_file_component(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// `YYYYMMDD_HHMMSS` stamp used in every report file name.
pub fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// `<dir>/<stem>_<YYYYMMDD_HHMMSS>.<ext>`
pub fn timestamped_file(dir: &Path, stem: &str, at: DateTime<Utc>, ext: &str) -> PathBuf {
    dir.join(format!("{stem}_{}.{ext}", file_timestamp(at)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn resolves_existing_path_canonically() {
        let cwd = env::current_dir().unwrap();
        let resolved = resolve_absolute_path(Path::new("."));
        assert_eq!(resolved, std::fs::canonicalize(&cwd).unwrap());
    }

    #[test]
    fn normalizes_nonexistent_path_syntactically() {
        #[cfg(unix)]
        let root = Path::new("/");
        #[cfg(windows)]
        let root = Path::new("C:\\");

        let input = root
            .join("nonexistent_fixown")
            .join("foo")
            .join("..")
            .join("bar");
        let expected = root.join("nonexistent_fixown").join("bar");
        assert!(std::fs::canonicalize(&input).is_err());

        assert_eq!(resolve_absolute_path(&input), expected);
    }

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(
            sanitize_file_component("filesystem_processing"),
            "filesystem_processing"
        );
        assert_eq!(sanitize_file_component("a b/c:d-e"), "a_b_c_d-e");
        assert_eq!(sanitize_file_component(""), "unnamed");
    }

    #[test]
    fn timestamped_file_uses_compact_stamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let path = timestamped_file(Path::new("output"), "sid_ownership_analysis", at, "json");
        assert_eq!(
            path,
            Path::new("output").join("sid_ownership_analysis_20240309_070501.json")
        );
    }
}
