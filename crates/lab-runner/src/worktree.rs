//! Per-experiment working directories

use crate::command::CommandExecutor;
use crate::error::LabError;
use lab_core::{ExperimentSpec, WorktreeConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Timeout for `git worktree add`
pub const WORKTREE_TIMEOUT: Duration = Duration::from_secs(120);

/// Resolves the directory each experiment runs in
pub struct WorktreeManager {
    repo_root: PathBuf,
    config: WorktreeConfig,
    executor: Arc<dyn CommandExecutor>,
}

impl WorktreeManager {
    /// Create a manager for `repo_root`
    pub fn new(
        repo_root: impl Into<PathBuf>,
        config: WorktreeConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            config,
            executor,
        }
    }

    /// Directory that would hold the worktree of `id`
    #[must_use]
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.config.root_for(&self.repo_root).join(id)
    }

    /// Working directory for an experiment
    ///
    /// Disabled worktrees run in the repo root. An existing worktree is
    /// reused as is. Otherwise the branch is (re)created from the base ref;
    /// in a dry run nothing is created.
    pub async fn resolve(&self, spec: &ExperimentSpec, dry_run: bool) -> Result<PathBuf, LabError> {
        if !self.config.enabled {
            return Ok(self.repo_root.clone());
        }

        let path = self.path_for(&spec.id);
        if path.exists() {
            info!(experiment = %spec.id, path = %path.display(), "reusing worktree");
            return Ok(path);
        }
        if dry_run {
            return Ok(path);
        }

        let root = self.config.root_for(&self.repo_root);
        std::fs::create_dir_all(&root).map_err(|e| LabError::Worktree {
            id: spec.id.clone(),
            message: format!("cannot create {}: {e}", root.display()),
        })?;

        let argv = self.add_command(spec, &path);
        let result = self
            .executor
            .run(&argv, &self.repo_root, WORKTREE_TIMEOUT)
            .await;
        if !result.success() {
            return Err(LabError::Worktree {
                id: spec.id.clone(),
                message: result.output_excerpt().to_string(),
            });
        }

        info!(experiment = %spec.id, path = %path.display(), "worktree created");
        Ok(path)
    }

    fn add_command(&self, spec: &ExperimentSpec, path: &Path) -> Vec<String> {
        vec![
            "git".to_string(),
            "worktree".to_string(),
            "add".to_string(),
            "-B".to_string(),
            self.config.branch_for(spec),
            path.display().to_string(),
            self.config.base_ref.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockCommandExecutor;
    use lab_core::CommandResult;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn enabled(root: &Path) -> WorktreeConfig {
        WorktreeConfig {
            enabled: true,
            worktree_root: Some(root.to_path_buf()),
            ..WorktreeConfig::default()
        }
    }

    #[tokio::test]
    async fn disabled_uses_repo_root() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_run().never();
        let manager = WorktreeManager::new("/repo", WorktreeConfig::default(), Arc::new(mock));

        let path = manager.resolve(&ExperimentSpec::new("a"), false).await.unwrap();
        assert_eq!(path, PathBuf::from("/repo"));
    }

    #[tokio::test]
    async fn existing_worktree_is_reused_without_commands() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("trees/a")).unwrap();
        let mut mock = MockCommandExecutor::new();
        mock.expect_run().never();
        let manager =
            WorktreeManager::new(dir.path(), enabled(&dir.path().join("trees")), Arc::new(mock));

        let path = manager.resolve(&ExperimentSpec::new("a"), false).await.unwrap();
        assert_eq!(path, dir.path().join("trees/a"));
    }

    #[tokio::test]
    async fn missing_worktree_is_created_from_base_ref() {
        let dir = TempDir::new().unwrap();
        let trees = dir.path().join("trees");
        let expected = vec![
            "git".to_string(),
            "worktree".to_string(),
            "add".to_string(),
            "-B".to_string(),
            "exp/b".to_string(),
            trees.join("b").display().to_string(),
            "main".to_string(),
        ];
        let repo = dir.path().to_path_buf();

        let mut mock = MockCommandExecutor::new();
        mock.expect_run()
            .withf(move |argv, cwd, timeout| {
                argv == expected.as_slice() && cwd == repo.as_path() && *timeout == WORKTREE_TIMEOUT
            })
            .times(1)
            .returning(|argv, _, _| CommandResult::dry_run(argv));
        let manager = WorktreeManager::new(dir.path(), enabled(&trees), Arc::new(mock));

        let path = manager.resolve(&ExperimentSpec::new("b"), false).await.unwrap();
        assert_eq!(path, trees.join("b"));
    }

    #[tokio::test]
    async fn creation_failure_names_experiment() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockCommandExecutor::new();
        mock.expect_run().returning(|argv, _, _| {
            let mut result = CommandResult::dry_run(argv);
            result.exit_code = Some(128);
            result.stderr = "fatal: invalid reference: main".to_string();
            result
        });
        let manager =
            WorktreeManager::new(dir.path(), enabled(&dir.path().join("t")), Arc::new(mock));

        let err = manager
            .resolve(&ExperimentSpec::new("gl-blit"), false)
            .await
            .unwrap_err();
        assert!(matches!(&err, LabError::Worktree { id, .. } if id == "gl-blit"));
        assert!(err.to_string().contains("invalid reference"));
    }

    #[tokio::test]
    async fn dry_run_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockCommandExecutor::new();
        mock.expect_run().never();
        let manager =
            WorktreeManager::new(dir.path(), enabled(&dir.path().join("t")), Arc::new(mock));

        let path = manager.resolve(&ExperimentSpec::new("a"), true).await.unwrap();
        assert_eq!(path, dir.path().join("t/a"));
        assert!(!dir.path().join("t").exists());
    }
}
