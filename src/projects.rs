//! Per-user data layout and the projects registry.
//!
//! The data directory holds `projects.json`, one database per project
//! (`<prefix>_<hash8>.db`), the disk-cache database under `cache/`, and
//! pre-migration snapshots under `backups/`. Environment overrides:
//! `CODEGRAPH_DATA_DIR`, `CODEGRAPH_CACHE_DIR`, `CODEGRAPH_TOOL_HOST`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::{clean_path, content_hash, now_secs};

/// Project marker file written by `init`.
pub const MARKER_FILE: &str = "codegraph.toml";

/// Default per-user data directory, honoring `CODEGRAPH_DATA_DIR`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CODEGRAPH_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("codegraph")
}

/// Disk-cache database location, honoring `CODEGRAPH_CACHE_DIR`.
pub fn cache_db_path() -> PathBuf {
    if let Ok(dir) = std::env::var("CODEGRAPH_CACHE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir).join("parse_cache.db");
        }
    }
    data_dir().join("cache").join("parse_cache.db")
}

pub fn backups_dir() -> PathBuf {
    data_dir().join("backups")
}

/// True when an external tool host drives the CLI: no prompts, no rich output.
pub fn tool_host_mode() -> bool {
    std::env::var("CODEGRAPH_TOOL_HOST").is_ok_and(|v| !v.is_empty() && v != "0")
}

/// A short human-readable prefix from the project directory name, so database
/// files in the data dir are recognizable at a glance.
fn semantic_prefix(root: &Path) -> String {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());
    let cleaned: String =
        name.chars().map(|c| if c.is_alphanumeric() { c } else { '_' }).take(24).collect();
    if cleaned.is_empty() { "project".to_string() } else { cleaned }
}

/// Database path for a project root: `<data_dir>/<prefix>_<hash8>.db`.
pub fn db_path_for(root: &Path, base: &Path) -> PathBuf {
    let canonical = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let hash = content_hash(clean_path(&canonical.to_string_lossy()).as_bytes());
    base.join(format!("{}_{}.db", semantic_prefix(&canonical), &hash[..8]))
}

// ─── Registry ───────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectEntry {
    pub name: String,
    pub root: String,
    pub db_file: String,
    pub last_indexed: Option<i64>,
    pub db_size: u64,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct RegistryFile {
    projects: Vec<ProjectEntry>,
}

/// `projects.json`: project name -> root path, last-indexed time, db size.
pub struct ProjectsRegistry {
    path: PathBuf,
    projects: Vec<ProjectEntry>,
}

impl ProjectsRegistry {
    pub fn load(base: &Path) -> Result<Self, IndexError> {
        let path = base.join("projects.json");
        let projects = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str::<RegistryFile>(&raw).map(|f| f.projects).unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(ProjectsRegistry { path, projects })
    }

    pub fn projects(&self) -> &[ProjectEntry] {
        &self.projects
    }

    /// Record (or refresh) a project after an index run.
    pub fn touch(&mut self, root: &Path, db_file: &Path) -> Result<(), IndexError> {
        let root_str = clean_path(&root.to_string_lossy());
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root_str.clone());
        let db_size = std::fs::metadata(db_file).map(|m| m.len()).unwrap_or(0);
        let entry = ProjectEntry {
            name,
            root: root_str.clone(),
            db_file: clean_path(&db_file.to_string_lossy()),
            last_indexed: Some(now_secs()),
            db_size,
        };
        match self.projects.iter_mut().find(|p| p.root == root_str) {
            Some(existing) => *existing = entry,
            None => self.projects.push(entry),
        }
        self.save()
    }

    /// Find by name or by root path.
    pub fn find(&self, name_or_path: &str) -> Option<&ProjectEntry> {
        let as_path = std::fs::canonicalize(name_or_path)
            .map(|p| clean_path(&p.to_string_lossy()))
            .unwrap_or_else(|_| name_or_path.to_string());
        self.projects.iter().find(|p| p.name == name_or_path || p.root == as_path)
    }

    /// Remove a project's registry entry and its database file.
    pub fn remove(&mut self, name_or_path: &str) -> Result<Option<ProjectEntry>, IndexError> {
        let Some(index) = self
            .find(name_or_path)
            .and_then(|found| self.projects.iter().position(|p| p.root == found.root))
        else {
            return Ok(None);
        };
        let entry = self.projects.remove(index);
        if Path::new(&entry.db_file).exists() {
            std::fs::remove_file(&entry.db_file)?;
        }
        self.save()?;
        Ok(Some(entry))
    }

    /// Delete databases whose project root no longer exists, plus database
    /// files in the data dir that no registry entry references.
    pub fn clean_orphans(&mut self, base: &Path) -> Result<usize, IndexError> {
        let mut removed = 0;

        let stale_roots: Vec<String> = self
            .projects
            .iter()
            .filter(|p| !Path::new(&p.root).exists())
            .map(|p| p.root.clone())
            .collect();
        for root in stale_roots {
            if let Some(pos) = self.projects.iter().position(|p| p.root == root) {
                let entry = self.projects.remove(pos);
                if Path::new(&entry.db_file).exists() {
                    std::fs::remove_file(&entry.db_file)?;
                }
                removed += 1;
            }
        }

        if base.exists() {
            for entry in std::fs::read_dir(base)?.flatten() {
                let path = entry.path();
                let is_db = path.extension().is_some_and(|e| e == "db");
                if !is_db {
                    continue;
                }
                let path_str = clean_path(&path.to_string_lossy());
                if !self.projects.iter().any(|p| p.db_file == path_str) {
                    std::fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }

        self.save()?;
        Ok(removed)
    }

    fn save(&self) -> Result<(), IndexError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&RegistryFile { projects: self.projects.clone() })?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

// ─── Project marker ─────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Default)]
struct MarkerConfig {
    #[serde(default)]
    project: MarkerProject,
    #[serde(default)]
    ignore: MarkerIgnore,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct MarkerProject {
    #[serde(default)]
    name: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct MarkerIgnore {
    #[serde(default)]
    patterns: Vec<String>,
}

/// Write the default marker file. Returns false when it already exists and
/// `force` is not set.
pub fn write_marker(root: &Path, force: bool) -> Result<bool, IndexError> {
    let path = root.join(MARKER_FILE);
    if path.exists() && !force {
        return Ok(false);
    }
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());
    let config = MarkerConfig {
        project: MarkerProject { name },
        ignore: MarkerIgnore { patterns: Vec::new() },
    };
    let raw = toml::to_string_pretty(&config)
        .map_err(|e| IndexError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    std::fs::write(&path, raw)?;
    Ok(true)
}

/// Extra ignore patterns declared in the project marker, if any.
pub fn marker_ignore_patterns(root: &Path) -> Vec<String> {
    let path = root.join(MARKER_FILE);
    let Ok(raw) = std::fs::read_to_string(&path) else { return Vec::new() };
    match toml::from_str::<MarkerConfig>(&raw) {
        Ok(config) => config.ignore.patterns,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable project marker");
            Vec::new()
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
