//! Workspace continuity documents
//!
//! A small fixed set of Markdown files read fresh on every request. Missing
//! files are simply empty.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub const PERSONA_FILE: &str = "SOUL.md";
pub const GUIDE_FILE: &str = "AGENTS.md";
pub const ENVIRONMENT_FILE: &str = "TOOLS.md";
pub const MEMORY_FILE: &str = "MEMORY.md";

/// Contents of the continuity documents, trimmed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceDocs {
    /// Persona and voice
    pub persona: String,
    /// How to operate inside the workspace
    pub guide: String,
    /// Notes about the local environment and tools
    pub environment: String,
    /// Curated long-term memory
    pub memory: String,
}

impl WorkspaceDocs {
    pub fn is_empty(&self) -> bool {
        self.persona.is_empty()
            && self.guide.is_empty()
            && self.environment.is_empty()
            && self.memory.is_empty()
    }
}

/// Loads [`WorkspaceDocs`] from a directory
#[derive(Debug, Clone)]
pub struct WorkspaceLoader {
    dir: PathBuf,
}

impl WorkspaceLoader {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn load(&self) -> WorkspaceDocs {
        let (persona, guide, environment, memory) = tokio::join!(
            read_doc(self.dir.join(PERSONA_FILE)),
            read_doc(self.dir.join(GUIDE_FILE)),
            read_doc(self.dir.join(ENVIRONMENT_FILE)),
            read_doc(self.dir.join(MEMORY_FILE)),
        );
        WorkspaceDocs {
            persona,
            guide,
            environment,
            memory,
        }
    }
}

async fn read_doc(path: PathBuf) -> String {
    match fs::read_to_string(&path).await {
        Ok(content) => content.trim().to_string(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Workspace document missing: {:?}", path);
            String::new()
        }
        Err(e) => {
            warn!("Failed to read workspace document {:?}: {}", path, e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let loader = WorkspaceLoader::new(temp_dir.path().join("nope"));
        assert!(loader.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_loads_and_trims() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(PERSONA_FILE), "\n  Warm and brief.\n\n").unwrap();
        std::fs::write(temp_dir.path().join(MEMORY_FILE), "Allergic to peanuts").unwrap();

        let docs = WorkspaceLoader::new(temp_dir.path().to_path_buf()).load().await;
        assert_eq!(
            docs,
            WorkspaceDocs {
                persona: "Warm and brief.".to_string(),
                guide: String::new(),
                environment: String::new(),
                memory: "Allergic to peanuts".to_string(),
            }
        );
    }
}
