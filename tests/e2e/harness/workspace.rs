use anyhow::{Context, Result};
use insight_core::{InsightConfig, InsightProject};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Environment variable all e2e projects read their (dummy) API key from.
pub const TEST_KEY_ENV: &str = "INSIGHT_E2E_KEY";

/// Manages an isolated project directory.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create an empty workspace.
    pub fn empty() -> Result<Self> {
        // Idempotent; tests run in parallel within one process.
        std::env::set_var(TEST_KEY_ENV, "test-key");
        let dir = TempDir::new().context("Failed to create temp directory")?;
        Ok(Self { dir })
    }

    /// Create a workspace seeded with a small cross-referencing project:
    /// `src/main.rs` uses `greet` declared in `src/lib.rs`, and
    /// `src/island.rs` references nothing.
    pub fn with_sample_project() -> Result<Self> {
        let workspace = Self::empty()?;
        workspace.write_file("src/lib.rs", "pub fn greet() {}\n")?;
        workspace.write_file("src/main.rs", "fn main() {\n    greet();\n}\n")?;
        workspace.write_file("src/island.rs", "fn isolated_thing() {}\n")?;
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Initialize an insight project pointed at the scripted backend.
    ///
    /// Throttling is disabled and the key comes from the shared test env
    /// var, so no real credentials are needed.
    pub fn init_project(&self, backend_url: &str) -> Result<InsightProject> {
        self.init_project_with(backend_url, |_| {})
    }

    /// Like `init_project` but lets the test adjust configuration before
    /// the project is opened.
    pub fn init_project_with<F>(&self, backend_url: &str, adjust: F) -> Result<InsightProject>
    where
        F: FnOnce(&mut InsightConfig),
    {
        let project = InsightProject::init(self.path())?;
        drop(project); // release the lock before rewriting config

        let mut config = InsightConfig::default();
        config.backend.base_url = backend_url.to_string();
        config.backend.api_key_env = TEST_KEY_ENV.to_string();
        config.backend.requests_per_minute = 0;
        config.backend.request_timeout_secs = 10;
        adjust(&mut config);
        config.save(&self.path().join(".insight"))?;

        self.open_project()
    }

    /// Open the existing project in this workspace.
    pub fn open_project(&self) -> Result<InsightProject> {
        Ok(InsightProject::open(self.path())?)
    }

    /// Write a file, creating parent directories.
    pub fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let full_path = self.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {}", path))?;
        }
        fs::write(&full_path, content).with_context(|| format!("Failed to write file: {}", path))
    }

    /// Read a file back as UTF-8.
    pub fn read_file(&self, path: &str) -> Result<String> {
        fs::read_to_string(self.path().join(path))
            .with_context(|| format!("Failed to read file: {}", path))
    }

    pub fn file_exists(&self, path: &str) -> bool {
        self.path().join(path).exists()
    }
}
