use std::path::PathBuf;

/// On-disk layout under a project root.
#[derive(Debug, Clone)]
pub struct CowritePaths {
    pub root: PathBuf,
    pub cowrite_dir: PathBuf,
    pub config_json: PathBuf,
    pub sessions_dir: PathBuf,
}

impl CowritePaths {
    /// Derive all paths from a project root. Pure computation, no I/O.
    pub fn discover(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let cowrite_dir = root.join(".cowrite");
        Self {
            config_json: cowrite_dir.join("config.json"),
            sessions_dir: cowrite_dir.join("sessions"),
            cowrite_dir,
            root,
        }
    }

    pub fn session_file(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.json"))
    }
}
