use crate::core_error::{CommandError, FsFailure};
use log::warn;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

const MAX_SYMLINK_HOPS: usize = 40;

/// Server-side state of one connection.
///
/// `current_dir` is always the base directory or a path nested under it;
/// it only moves through [`Session::change_dir`] with a path that came out of
/// [`Session::resolve`].
#[derive(Debug)]
pub struct Session {
    base_dir: PathBuf,
    current_dir: PathBuf,
}

impl Session {
    /// `base_dir` must already be canonical.
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            current_dir: base_dir.clone(),
            base_dir,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Maps a client argument to a host path inside the sandbox.
    ///
    /// Absolute arguments are host paths, relative ones hang off the current
    /// directory. The target need not exist. Every symlink on the way is
    /// followed, dangling ones included, so a link cannot lead outside.
    pub fn resolve(&self, arg: &str) -> Result<PathBuf, CommandError> {
        let candidate = if Path::new(arg).is_absolute() {
            PathBuf::from(arg)
        } else {
            self.current_dir.join(arg)
        };

        let resolved = resolve_links(&normalize(&candidate))?;
        if !resolved.starts_with(&self.base_dir) {
            warn!("Path is outside of the allowed area: {:?}", resolved);
            return Err(CommandError::SandboxViolation(resolved));
        }
        Ok(resolved)
    }

    pub fn change_dir(&mut self, target: PathBuf) {
        debug_assert!(target.starts_with(&self.base_dir));
        self.current_dir = target;
    }
}

/// Folds `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    path.components().fold(PathBuf::new(), |mut acc, comp| {
        match comp {
            Component::ParentDir => {
                acc.pop();
            }
            Component::CurDir => {}
            other => acc.push(other.as_os_str()),
        }
        acc
    })
}

enum Step {
    Parent,
    Name(OsString),
}

/// Pushes the components of `path` onto `pending` so they pop in order.
/// Returns the root of `path` when it is absolute.
fn schedule(path: &Path, pending: &mut Vec<Step>) -> Option<PathBuf> {
    let mut root: Option<PathBuf> = None;
    let mut steps = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(_) | Component::RootDir => {
                root.get_or_insert_with(PathBuf::new).push(comp.as_os_str())
            }
            Component::CurDir => {}
            Component::ParentDir => steps.push(Step::Parent),
            Component::Normal(name) => steps.push(Step::Name(name.to_os_string())),
        }
    }
    pending.extend(steps.into_iter().rev());
    root
}

/// Physical resolution of an absolute path, one component at a time.
///
/// Existing components that are symlinks are replaced by their target, even
/// when the target does not exist. Components past the first missing one are
/// appended as they are.
fn resolve_links(path: &Path) -> Result<PathBuf, CommandError> {
    let mut pending = Vec::new();
    let mut resolved = schedule(path, &mut pending).unwrap_or_default();
    let mut hops = 0;

    while let Some(step) = pending.pop() {
        let name = match step {
            Step::Parent => {
                resolved.pop();
                continue;
            }
            Step::Name(name) => name,
        };
        let next = resolved.join(&name);

        let is_link = fs::symlink_metadata(&next)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            resolved = next;
            continue;
        }

        hops += 1;
        if hops > MAX_SYMLINK_HOPS {
            warn!("Too many symbolic links while resolving {:?}", path);
            return Err(CommandError::filesystem(FsFailure::TooManyLinks));
        }
        let target = fs::read_link(&next).map_err(|e| {
            warn!("Cannot read symbolic link {:?}: {}", next, e);
            CommandError::filesystem(FsFailure::CannotResolve)
        })?;
        if let Some(root) = schedule(&target, &mut pending) {
            resolved = root;
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sandbox() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        fs::create_dir_all(base.join("docs/empty")).unwrap();
        fs::write(base.join("docs/readme.txt"), b"hello, world\n").unwrap();
        let session = Session::new(base.canonicalize().unwrap());
        (dir, session)
    }

    #[test]
    fn test_normalize_folds_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../..")), PathBuf::from("/"));
    }

    #[test]
    fn test_relative_path_resolves_under_current_dir() {
        let (_tmp, session) = sandbox();
        let resolved = session.resolve("docs/readme.txt").unwrap();
        assert_eq!(resolved, session.base_dir().join("docs/readme.txt"));
    }

    #[test]
    fn test_missing_target_still_resolves() {
        let (_tmp, session) = sandbox();
        let resolved = session.resolve("docs/new/deeper").unwrap();
        assert_eq!(resolved, session.base_dir().join("docs/new/deeper"));
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let (_tmp, session) = sandbox();
        assert!(matches!(
            session.resolve("../../etc"),
            Err(CommandError::SandboxViolation(_))
        ));
        assert!(matches!(
            session.resolve("docs/../../outside.txt"),
            Err(CommandError::SandboxViolation(_))
        ));
    }

    #[test]
    fn test_absolute_paths_are_checked() {
        let (_tmp, session) = sandbox();
        assert!(session.resolve("/etc").is_err());
        let inside = session.base_dir().join("docs");
        assert_eq!(session.resolve(inside.to_str().unwrap()).unwrap(), inside);
    }

    #[test]
    fn test_sibling_with_common_prefix_is_rejected() {
        let (tmp, session) = sandbox();
        fs::create_dir_all(tmp.path().join("base2")).unwrap();
        assert!(session.resolve("../base2").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let (tmp, session) = sandbox();
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, session.base_dir().join("link")).unwrap();

        assert!(matches!(
            session.resolve("link"),
            Err(CommandError::SandboxViolation(_))
        ));
        assert!(session.resolve("link/new.txt").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_escape_is_rejected() {
        let (tmp, session) = sandbox();
        std::os::unix::fs::symlink("../outside_created.txt", session.base_dir().join("link"))
            .unwrap();

        assert!(matches!(
            session.resolve("link"),
            Err(CommandError::SandboxViolation(_))
        ));
        assert!(!tmp.path().join("outside_created.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_inside_the_base_are_followed() {
        let (_tmp, session) = sandbox();
        std::os::unix::fs::symlink("docs", session.base_dir().join("alias")).unwrap();
        std::os::unix::fs::symlink("docs/todo.txt", session.base_dir().join("later")).unwrap();

        assert_eq!(
            session.resolve("alias/readme.txt").unwrap(),
            session.base_dir().join("docs/readme.txt")
        );
        // Dangling, but pointing inside.
        assert_eq!(
            session.resolve("later").unwrap(),
            session.base_dir().join("docs/todo.txt")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_an_error() {
        let (_tmp, session) = sandbox();
        std::os::unix::fs::symlink("b", session.base_dir().join("a")).unwrap();
        std::os::unix::fs::symlink("a", session.base_dir().join("b")).unwrap();

        assert!(matches!(
            session.resolve("a"),
            Err(CommandError::Filesystem(FsFailure::TooManyLinks))
        ));
    }

    #[test]
    fn test_change_dir_moves_relative_resolution() {
        let (_tmp, mut session) = sandbox();
        let docs = session.resolve("docs").unwrap();
        session.change_dir(docs.clone());
        assert_eq!(session.current_dir(), docs.as_path());
        assert_eq!(session.resolve("..").unwrap(), session.base_dir());
    }
}
