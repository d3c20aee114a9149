//! Registry of projects the reporting service knows about.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! [[project]]
//! name = "mozilla-central"
//!
//! [[project]]
//! name = "try"
//! enabled = false
//! ```
//!
//! An open registry (no file configured) accepts every project.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct ProjectsFile {
    #[serde(default)]
    project: Vec<ProjectMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMeta {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Default)]
pub struct ProjectRegistry {
    /// `None` means every project is accepted.
    projects: Option<HashMap<String, ProjectMeta>>,
}

impl ProjectRegistry {
    /// A registry that accepts every project.
    pub fn open() -> Self {
        Self { projects: None }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read projects file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad projects file {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: ProjectsFile = toml::from_str(content)?;
        let projects = file
            .project
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Ok(Self {
            projects: Some(projects),
        })
    }

    /// Should events for `project` be reported?
    pub fn accepts(&self, project: &str) -> bool {
        match &self.projects {
            None => true,
            Some(projects) => projects.get(project).is_some_and(|p| p.enabled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_registry_accepts_anything() {
        assert!(ProjectRegistry::open().accepts("whatever"));
    }

    #[test]
    fn file_registry_filters() {
        let registry = ProjectRegistry::from_toml(
            r#"
            [[project]]
            name = "mozilla-central"

            [[project]]
            name = "try"
            enabled = false
            "#,
        )
        .unwrap();

        assert!(registry.accepts("mozilla-central"));
        assert!(!registry.accepts("try"));
        assert!(!registry.accepts("gaia"));
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = ProjectRegistry::load_from_file(Path::new("/nonexistent/projects.toml"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
