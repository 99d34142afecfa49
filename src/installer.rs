use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::config::HookSettings;
use crate::error::InstallError;

/// A hook copied into the hooks directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledHook {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub bytes: usize,
}

/// How an installed hook compares to its tracked source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookState {
    Current,
    Missing,
    /// Content differs from the tracked source
    Outdated,
    /// Content matches but the permission bits do not
    WrongMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct HookStatus {
    pub name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub state: HookState,
}

/// Copies tracked hook scripts into the local git hooks directory
#[derive(Debug, Clone)]
pub struct HookInstaller {
    root: PathBuf,
    source: String,
    hooks_dir: PathBuf,
    mode: u32,
}

impl HookInstaller {
    pub fn new(root: &Path, settings: &HookSettings) -> Self {
        HookInstaller {
            root: root.to_path_buf(),
            source: settings.source.clone(),
            hooks_dir: root.join(&settings.hooks_dir),
            mode: settings.mode,
        }
    }

    pub fn hooks_dir(&self) -> &Path {
        &self.hooks_dir
    }

    /// Resolve the configured source into concrete hook files.
    /// A plain path must exist; a glob must match at least one file.
    pub fn sources(&self) -> Result<Vec<PathBuf>, InstallError> {
        let literal = self.root.join(&self.source);
        let not_found = || InstallError::SourceNotFound {
            path: literal.clone(),
        };

        if !is_glob(&self.source) {
            return if literal.is_file() {
                Ok(vec![literal.clone()])
            } else {
                Err(not_found())
            };
        }

        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            self.source
        );
        let paths = glob::glob(&pattern).map_err(|_| not_found())?;
        let files: Vec<PathBuf> = paths
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();

        if files.is_empty() {
            Err(not_found())
        } else {
            Ok(files)
        }
    }

    /// Install every source hook, replacing whatever is in the hooks directory.
    ///
    /// All sources are resolved and read before the destination is touched,
    /// so a missing source leaves the hooks directory as it was. Each file is
    /// written to a temporary sibling, given its mode, then renamed into place.
    pub fn install(&self) -> Result<Vec<InstalledHook>, InstallError> {
        let mut pending = Vec::new();
        for (source, destination) in self.targets()? {
            let content = fs::read(&source).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => InstallError::SourceNotFound {
                    path: source.clone(),
                },
                _ => InstallError::SourceUnreadable {
                    path: source.clone(),
                    source: e,
                },
            })?;
            pending.push((source, destination, content));
        }

        self.ensure_hooks_dir()?;

        let mut installed = Vec::with_capacity(pending.len());
        for (source, destination, content) in pending {
            self.write_hook(&destination, &content)?;
            tracing::info!(
                hook = %destination.display(),
                bytes = content.len(),
                mode = %format!("{:o}", self.mode),
                "installed git hook"
            );
            installed.push(InstalledHook {
                source,
                destination,
                bytes: content.len(),
            });
        }

        Ok(installed)
    }

    /// Compare each source hook with its installed copy without changing anything
    pub fn status(&self) -> Result<Vec<HookStatus>, InstallError> {
        let mut statuses = Vec::new();

        for (source, destination) in self.targets()? {
            let name = file_name(&source);

            let state = if !destination.is_file() {
                HookState::Missing
            } else {
                let expected = fs::read(&source).map_err(|e| InstallError::SourceUnreadable {
                    path: source.clone(),
                    source: e,
                })?;
                match fs::read(&destination) {
                    Ok(actual) if actual != expected => HookState::Outdated,
                    Ok(_) if !mode_matches(&destination, self.mode) => HookState::WrongMode,
                    Ok(_) => HookState::Current,
                    Err(_) => HookState::Outdated,
                }
            };

            tracing::debug!(hook = %name, ?state, "checked git hook");
            statuses.push(HookStatus {
                name,
                source,
                destination,
                state,
            });
        }

        Ok(statuses)
    }

    /// Pair every source with its destination, refusing two sources that
    /// share a file name
    fn targets(&self) -> Result<Vec<(PathBuf, PathBuf)>, InstallError> {
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut targets = Vec::new();

        for source in self.sources()? {
            let destination = self.destination_for(&source)?;
            if let Some(first) = claimed.get(&destination) {
                return Err(InstallError::DuplicateDestination {
                    destination,
                    first: first.clone(),
                    second: source,
                });
            }
            claimed.insert(destination.clone(), source.clone());
            targets.push((source, destination));
        }

        Ok(targets)
    }

    /// The git directory must already exist; only `hooks` beneath it is created.
    fn ensure_hooks_dir(&self) -> Result<(), InstallError> {
        if let Some(git_dir) = self.hooks_dir.parent() {
            if !git_dir.is_dir() {
                return Err(InstallError::unwritable(
                    git_dir,
                    io::Error::new(io::ErrorKind::NotFound, "not inside a git repository"),
                ));
            }
        }

        fs::create_dir_all(&self.hooks_dir)
            .map_err(|e| InstallError::unwritable(&self.hooks_dir, e))
    }

    fn destination_for(&self, source: &Path) -> Result<PathBuf, InstallError> {
        match source.file_name() {
            Some(name) => Ok(self.hooks_dir.join(name)),
            None => Err(InstallError::SourceNotFound {
                path: source.to_path_buf(),
            }),
        }
    }

    fn write_hook(&self, destination: &Path, content: &[u8]) -> Result<(), InstallError> {
        let unwritable = |e: io::Error| InstallError::unwritable(destination, e);

        let mut tmp = NamedTempFile::new_in(&self.hooks_dir).map_err(unwritable)?;
        tmp.write_all(content).map_err(unwritable)?;
        tmp.as_file().sync_all().map_err(unwritable)?;
        set_mode(tmp.path(), self.mode).map_err(unwritable)?;
        tmp.persist(destination)
            .map_err(|e| InstallError::unwritable(destination, e.error))?;
        Ok(())
    }
}

fn is_glob(source: &str) -> bool {
    source.contains(['*', '?', '['])
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn mode_matches(path: &Path, mode: u32) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o777 == mode)
}

#[cfg(not(unix))]
fn mode_matches(_path: &Path, _mode: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOOK: &str = "#!/bin/sh\necho checking\n";

    fn settings(source: &str) -> HookSettings {
        HookSettings {
            source: source.to_string(),
            hooks_dir: PathBuf::from(".git/hooks"),
            mode: 0o777,
        }
    }

    /// A repo with `.git/` and a tracked pre-commit hook
    fn make_repo(content: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        fs::create_dir_all(temp.path().join("config/git")).unwrap();
        fs::write(temp.path().join("config/git/pre-commit"), content).unwrap();
        temp
    }

    #[cfg(unix)]
    fn mode_of(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_install_copies_content() {
        let repo = make_repo(HOOK);
        let installer = HookInstaller::new(repo.path(), &settings("config/git/pre-commit"));

        let installed = installer.install().unwrap();
        assert_eq!(installed.len(), 1);

        let dest = repo.path().join(".git/hooks/pre-commit");
        assert_eq!(installed[0].destination, dest);
        assert_eq!(installed[0].bytes, HOOK.len());
        assert_eq!(fs::read_to_string(&dest).unwrap(), HOOK);
    }

    #[test]
    fn test_install_preserves_binary_content() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        fs::create_dir_all(temp.path().join("config/git")).unwrap();
        let bytes: Vec<u8> = (0..=255u8).chain([0, 0, 13, 10]).collect();
        fs::write(temp.path().join("config/git/pre-commit"), &bytes).unwrap();

        HookInstaller::new(temp.path(), &settings("config/git/pre-commit"))
            .install()
            .unwrap();

        assert_eq!(fs::read(temp.path().join(".git/hooks/pre-commit")).unwrap(), bytes);
    }

    #[cfg(unix)]
    #[test]
    fn test_install_sets_world_executable_mode() {
        let repo = make_repo(HOOK);
        HookInstaller::new(repo.path(), &settings("config/git/pre-commit"))
            .install()
            .unwrap();

        assert_eq!(mode_of(&repo.path().join(".git/hooks/pre-commit")), 0o777);
    }

    #[cfg(unix)]
    #[test]
    fn test_install_applies_configured_mode() {
        let repo = make_repo(HOOK);
        let mut s = settings("config/git/pre-commit");
        s.mode = 0o755;
        HookInstaller::new(repo.path(), &s).install().unwrap();

        assert_eq!(mode_of(&repo.path().join(".git/hooks/pre-commit")), 0o755);
    }

    #[test]
    fn test_install_is_idempotent() {
        let repo = make_repo(HOOK);
        let installer = HookInstaller::new(repo.path(), &settings("config/git/pre-commit"));

        let first = installer.install().unwrap();
        let second = installer.install().unwrap();
        assert_eq!(first, second);

        let hooks: Vec<_> = fs::read_dir(repo.path().join(".git/hooks"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(hooks, vec![std::ffi::OsString::from("pre-commit")]);
        let dest = repo.path().join(".git/hooks/pre-commit");
        assert_eq!(fs::read_to_string(&dest).unwrap(), HOOK);
        #[cfg(unix)]
        assert_eq!(mode_of(&dest), 0o777);
    }

    #[test]
    fn test_same_named_sources_are_rejected() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        for (dir, body) in [("a", "A"), ("b", "B")] {
            fs::create_dir_all(temp.path().join("config").join(dir)).unwrap();
            fs::write(temp.path().join("config").join(dir).join("pre-commit"), body).unwrap();
        }
        let installer = HookInstaller::new(temp.path(), &settings("config/*/pre-commit"));

        let err = installer.install().unwrap_err();
        match &err {
            InstallError::DuplicateDestination {
                destination,
                first,
                second,
            } => {
                assert_eq!(destination, &temp.path().join(".git/hooks/pre-commit"));
                assert_eq!(first, &temp.path().join("config/a/pre-commit"));
                assert_eq!(second, &temp.path().join("config/b/pre-commit"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("config/a/pre-commit"));
        assert!(!temp.path().join(".git/hooks").exists());

        assert!(matches!(
            installer.status().unwrap_err(),
            InstallError::DuplicateDestination { .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_install_overwrites_existing_hook() {
        let repo = make_repo(HOOK);
        let hooks = repo.path().join(".git/hooks");
        fs::create_dir_all(&hooks).unwrap();
        fs::write(hooks.join("pre-commit"), "#!/bin/sh\nexit 1\n# a much longer stale hook body\n")
            .unwrap();
        set_mode(&hooks.join("pre-commit"), 0o444).unwrap();

        HookInstaller::new(repo.path(), &settings("config/git/pre-commit"))
            .install()
            .unwrap();

        assert_eq!(fs::read_to_string(hooks.join("pre-commit")).unwrap(), HOOK);
        assert_eq!(mode_of(&hooks.join("pre-commit")), 0o777);
    }

    #[test]
    fn test_missing_source_leaves_destination_untouched() {
        let temp = TempDir::new().unwrap();
        let hooks = temp.path().join(".git/hooks");
        fs::create_dir_all(&hooks).unwrap();
        fs::write(hooks.join("pre-commit"), "old").unwrap();

        let err = HookInstaller::new(temp.path(), &settings("config/git/pre-commit"))
            .install()
            .unwrap_err();

        match err {
            InstallError::SourceNotFound { path } => {
                assert_eq!(path, temp.path().join("config/git/pre-commit"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_to_string(hooks.join("pre-commit")).unwrap(), "old");
    }

    #[test]
    fn test_creates_hooks_dir_when_absent() {
        let repo = make_repo(HOOK);
        assert!(!repo.path().join(".git/hooks").exists());

        HookInstaller::new(repo.path(), &settings("config/git/pre-commit"))
            .install()
            .unwrap();

        assert!(repo.path().join(".git/hooks/pre-commit").is_file());
    }

    #[test]
    fn test_outside_git_repository_fails() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("config/git")).unwrap();
        fs::write(temp.path().join("config/git/pre-commit"), HOOK).unwrap();

        let err = HookInstaller::new(temp.path(), &settings("config/git/pre-commit"))
            .install()
            .unwrap_err();

        assert!(matches!(err, InstallError::DestinationUnwritable { .. }));
        assert!(err.to_string().contains(".git"));
        assert!(!temp.path().join(".git").exists());
    }

    #[test]
    fn test_destination_is_a_directory_fails() {
        let repo = make_repo(HOOK);
        fs::create_dir_all(repo.path().join(".git/hooks/pre-commit/nested")).unwrap();

        let err = HookInstaller::new(repo.path(), &settings("config/git/pre-commit"))
            .install()
            .unwrap_err();

        assert!(matches!(err, InstallError::DestinationUnwritable { .. }));
    }

    #[test]
    fn test_glob_source_installs_every_match() {
        let repo = make_repo(HOOK);
        fs::write(repo.path().join("config/git/commit-msg"), "#!/bin/sh\n").unwrap();

        let installed = HookInstaller::new(repo.path(), &settings("config/git/*"))
            .install()
            .unwrap();

        let names: Vec<String> = installed.iter().map(|h| file_name(&h.destination)).collect();
        assert_eq!(names, vec!["commit-msg", "pre-commit"]);
    }

    #[test]
    fn test_glob_without_matches_is_source_not_found() {
        let repo = make_repo(HOOK);

        let err = HookInstaller::new(repo.path(), &settings("config/hooks/*"))
            .install()
            .unwrap_err();

        assert!(matches!(err, InstallError::SourceNotFound { .. }));
    }

    #[test]
    fn test_status_reports_each_state() {
        let repo = make_repo(HOOK);
        let installer = HookInstaller::new(repo.path(), &settings("config/git/pre-commit"));
        let dest = repo.path().join(".git/hooks/pre-commit");

        assert_eq!(installer.status().unwrap()[0].state, HookState::Missing);

        installer.install().unwrap();
        assert_eq!(installer.status().unwrap()[0].state, HookState::Current);

        fs::write(repo.path().join("config/git/pre-commit"), "#!/bin/sh\necho new\n").unwrap();
        assert_eq!(installer.status().unwrap()[0].state, HookState::Outdated);

        installer.install().unwrap();
        #[cfg(unix)]
        {
            set_mode(&dest, 0o644).unwrap();
            assert_eq!(installer.status().unwrap()[0].state, HookState::WrongMode);
        }
    }
}
