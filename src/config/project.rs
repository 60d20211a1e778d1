//! Project id and dataset defaults.
//!
//! When no project is given explicitly, the Firebase CLI's project alias
//! file in the working directory is consulted, then `GOOGLE_PROJECT_ID`.

use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

const FIREBASERC: &str = ".firebaserc";
const PROJECT_ENV: &str = "GOOGLE_PROJECT_ID";

#[derive(Debug, Default, Deserialize)]
struct FirebaseRc {
    #[serde(default)]
    projects: FirebaseRcProjects,
}

#[derive(Debug, Default, Deserialize)]
struct FirebaseRcProjects {
    default: Option<String>,
}

/// Read `projects.default` from `<dir>/.firebaserc`.
///
/// A missing file yields `None`; an unreadable or malformed one is logged
/// and also yields `None`.
pub fn firebaserc_project(dir: &Path) -> Option<String> {
    let path = dir.join(FIREBASERC);
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read .firebaserc");
            return None;
        }
    };

    match serde_json::from_str::<FirebaseRc>(&contents) {
        Ok(rc) => rc.projects.default.filter(|p| !p.trim().is_empty()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed .firebaserc");
            None
        }
    }
}

/// Resolve the default project: `.firebaserc` in `dir`, then the
/// `GOOGLE_PROJECT_ID` environment variable.
pub fn default_project(dir: &Path) -> Option<String> {
    if let Some(project) = firebaserc_project(dir) {
        debug!(project = %project, "Using project from .firebaserc");
        return Some(project);
    }
    std::env::var(PROJECT_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .inspect(|project| debug!(project = %project, "Using project from {}", PROJECT_ENV))
}

/// Default export dataset for a project: dashes become underscores.
///
/// # Examples
///
/// ```
/// use fs_to_bq::config::default_dataset_id;
///
/// assert_eq!(default_dataset_id("my-proj"), "my_proj_firestore_export");
/// ```
pub fn default_dataset_id(project_id: &str) -> String {
    format!("{}_firestore_export", project_id.replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_firebaserc_default_project() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(".firebaserc"),
            r#"{"projects": {"default": "acme-prod", "staging": "acme-staging"}}"#,
        )
        .unwrap();

        assert_eq!(firebaserc_project(dir.path()).as_deref(), Some("acme-prod"));
        assert_eq!(default_project(dir.path()).as_deref(), Some("acme-prod"));
    }

    #[test]
    fn test_firebaserc_missing() {
        let dir = TempDir::new().unwrap();
        assert!(firebaserc_project(dir.path()).is_none());
    }

    #[test]
    fn test_firebaserc_malformed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".firebaserc"), "not json").unwrap();
        assert!(firebaserc_project(dir.path()).is_none());
    }

    #[test]
    fn test_firebaserc_without_default() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(".firebaserc"),
            r#"{"projects": {"staging": "acme-staging"}}"#,
        )
        .unwrap();
        assert!(firebaserc_project(dir.path()).is_none());
    }

    #[test]
    fn test_default_dataset_id() {
        assert_eq!(default_dataset_id("acme"), "acme_firestore_export");
        assert_eq!(
            default_dataset_id("acme-prod-1"),
            "acme_prod_1_firestore_export"
        );
    }
}
