/// Run-scoped workspaces
///
/// Every run gets `<base>/<uuid>`, owned by exactly one request and removed
/// when the run finishes, fails or unwinds.
use crate::config::types::{Result, SandboxError};
use crate::judge::pipeline::LanguagePipeline;
use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Name of the compiled artifact inside a workspace.
const BINARY_NAME: &str = "main";
/// Directory dependencies are installed into.
const DEPS_DIR_NAME: &str = ".deps";

/// Ephemeral directory for a single run
#[derive(Debug)]
pub struct Workspace {
    run_id: String,
    root: PathBuf,
    source_file: PathBuf,
    files: Vec<PathBuf>,
    disposed: bool,
}

impl Workspace {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn binary_path(&self) -> PathBuf {
        self.root.join(BINARY_NAME)
    }

    pub fn deps_dir(&self) -> PathBuf {
        self.root.join(DEPS_DIR_NAME)
    }

    /// Paths written by the engine (not by the snippet).
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Remove the workspace tree (idempotent)
    pub fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                // A snippet may chmod its own files; restore access and retry once.
                restore_permissions(&self.root);
                fs::remove_dir_all(&self.root).map_err(|retry| {
                    SandboxError::Workspace(format!(
                        "Failed to remove workspace {}: {} (first attempt: {})",
                        self.root.display(),
                        retry,
                        e
                    ))
                })
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            log::warn!("{}", e);
        }
    }
}

fn restore_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(metadata) = fs::symlink_metadata(path) else {
        return;
    };
    if !metadata.is_dir() {
        return;
    }
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o700));
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            restore_permissions(&entry.path());
        }
    }
}

/// Creates and sweeps run workspaces under one base directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| {
            SandboxError::Workspace(format!(
                "Failed to create workspace base directory {}: {}",
                base_dir.display(),
                e
            ))
        })?;

        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create a fresh workspace and write `code` under the pipeline's file name.
    pub fn provision(&self, pipeline: &LanguagePipeline, code: &str) -> Result<Workspace> {
        let file_name = Path::new(&pipeline.file_name);
        if file_name.file_name() != Some(file_name.as_os_str()) {
            return Err(SandboxError::Config(format!(
                "pipeline file name must be a bare file name: {}",
                pipeline.file_name
            )));
        }

        let run_id = Uuid::new_v4().to_string();
        let root = self.base_dir.join(&run_id);

        fs::DirBuilder::new()
            .mode(0o700)
            .create(&root)
            .map_err(|e| {
                SandboxError::Workspace(format!(
                    "Failed to create workspace directory {}: {}",
                    root.display(),
                    e
                ))
            })?;

        // From here on Drop owns cleanup, including the failed-write path.
        let mut workspace = Workspace {
            run_id,
            source_file: root.join(file_name),
            root,
            files: Vec::new(),
            disposed: false,
        };

        fs::write(&workspace.source_file, code).map_err(|e| {
            SandboxError::Workspace(format!(
                "Failed to write source file {}: {}",
                workspace.source_file.display(),
                e
            ))
        })?;
        workspace.files.push(workspace.source_file.clone());

        log::debug!(
            "Provisioned workspace {} for {}",
            workspace.root.display(),
            pipeline.language
        );
        Ok(workspace)
    }

    /// Remove workspaces older than `max_age`, left behind by a crashed process.
    pub fn sweep_stale(&self, max_age: Duration) -> Result<usize> {
        let mut cleaned = 0;
        let now = SystemTime::now();

        let entries = fs::read_dir(&self.base_dir).map_err(|e| {
            SandboxError::Workspace(format!(
                "Failed to read workspace directory {}: {}",
                self.base_dir.display(),
                e
            ))
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            let metadata = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Failed to get metadata for {}: {}", path.display(), e);
                    continue;
                }
            };
            if !metadata.is_dir() {
                continue;
            }
            // Only touch directories that look like ours.
            let is_run_dir = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| Uuid::parse_str(n).is_ok())
                .unwrap_or(false);
            if !is_run_dir {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            match age {
                Some(age) if age >= max_age => {}
                _ => continue,
            }

            log::info!("Removing stale workspace: {}", path.display());
            restore_permissions(&path);
            match fs::remove_dir_all(&path) {
                Ok(()) => cleaned += 1,
                Err(e) => log::warn!("Failed to remove stale workspace {}: {}", path.display(), e),
            }
        }

        Ok(cleaned)
    }
}
