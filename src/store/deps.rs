/// Per-caller package sets
///
/// Sets only grow: `add` unions new packages into what is already stored.
/// The whole map is rewritten atomically (temp file, fsync, rename) after
/// every change, so a crash leaves either the old or the new file.
use crate::config::types::{Result, SandboxError};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

type DependencyMap = BTreeMap<String, BTreeSet<String>>;

pub struct DependencyStore {
    path: PathBuf,
    packages: Mutex<DependencyMap>,
}

impl DependencyStore {
    /// Open the store, loading any previously persisted sets.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let packages = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => DependencyMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                SandboxError::Config(format!(
                    "Failed to parse dependency store {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DependencyMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            packages: Mutex::new(packages),
        })
    }

    /// Union `packages` into the caller's set and return the full set.
    ///
    /// The whole batch is rejected if any spec is invalid.
    pub fn add<S: AsRef<str>>(&self, caller_id: &str, packages: &[S]) -> Result<BTreeSet<String>> {
        let mut cleaned = Vec::with_capacity(packages.len());
        for package in packages {
            cleaned.push(validate_package(package.as_ref())?);
        }

        let mut map = self
            .packages
            .lock()
            .map_err(|_| SandboxError::Config("dependency store lock poisoned".to_string()))?;

        let mut result = map.get(caller_id).cloned().unwrap_or_default();
        let before = result.len();
        result.extend(cleaned);
        if result.len() == before {
            return Ok(result);
        }

        // Persist a candidate map; memory only changes once the file has.
        let mut candidate = map.clone();
        candidate.insert(caller_id.to_string(), result.clone());
        persist(&self.path, &candidate)?;
        *map = candidate;

        log::debug!(
            "Stored {} package(s) for {}",
            result.len() - before,
            caller_id
        );
        Ok(result)
    }

    pub fn get(&self, caller_id: &str) -> BTreeSet<String> {
        let map = match self.packages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(caller_id).cloned().unwrap_or_default()
    }
}

/// Accept anything a package manager would treat as a package spec and
/// nothing it could read as an option.
fn validate_package(spec: &str) -> Result<String> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(SandboxError::InvalidPackage("empty package name".to_string()));
    }
    if spec.starts_with('-') {
        return Err(SandboxError::InvalidPackage(format!(
            "{}: package names cannot start with '-'",
            spec
        )));
    }
    if spec.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(SandboxError::InvalidPackage(format!(
            "{:?}: package names cannot contain whitespace or control characters",
            spec
        )));
    }
    Ok(spec.to_string())
}

fn persist(target: &Path, map: &DependencyMap) -> Result<()> {
    let content = serde_json::to_vec_pretty(map)
        .map_err(|e| SandboxError::Config(format!("Failed to encode dependency store: {}", e)))?;
    atomic_write(target, &content)?;
    Ok(())
}

fn atomic_write(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent dir"))?;
    fs::create_dir_all(parent)?;

    // Same directory so the rename stays on one filesystem.
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        target.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id()
    ));

    {
        let mut f = fs::File::create(&temp_path)?;
        f.write_all(content)?;
        f.sync_all()?;
    }

    fs::rename(&temp_path, target)?;

    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}
