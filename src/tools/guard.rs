//! 写路径白名单：变更类技能不得写入任何用户的记忆、人格或审计日志目录
//!
//! 与 SecurityPolicy 的写权限检查相互独立：即便策略允许写入，目标落在受保护目录内也会被拒绝。
//! 路径先做词法规范化（消解 `.` / `..`），再对已存在的最长祖先做 canonicalize，防止符号链接绕过。

use std::path::{Component, Path, PathBuf};

use crate::core::{SecurityError, SecurityErrorKind};
use crate::policy::SecurityPolicy;

pub const DEFAULT_PROTECTED_DIRS: &[&str] = &["memory", "persona", "logs/audit"];

#[derive(Debug, Clone)]
pub struct WritePathGuard {
    data_root: PathBuf,
    /// 相对 `<data_root>/<user>/` 的受保护子目录
    protected: Vec<PathBuf>,
}

/// 词法规范化：不访问文件系统
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// 对已存在的最长祖先 canonicalize，再拼回不存在的尾部
pub fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let normalized = normalize_lexically(path);
    let mut existing = normalized.clone();
    let mut tail = Vec::new();
    loop {
        if let Ok(canon) = existing.canonicalize() {
            let mut out = canon;
            for part in tail.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name);
                existing = parent.to_path_buf();
            }
            _ => return normalized,
        }
    }
}

impl WritePathGuard {
    pub fn new(data_root: impl AsRef<Path>) -> Self {
        Self::with_protected_dirs(data_root, DEFAULT_PROTECTED_DIRS.iter().copied())
    }

    pub fn with_protected_dirs<I, S>(data_root: impl AsRef<Path>, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            data_root: data_root.as_ref().to_path_buf(),
            protected: dirs
                .into_iter()
                .map(|d| normalize_lexically(Path::new(d.as_ref())))
                .collect(),
        }
    }

    /// 目标路径是否落在某个用户的受保护目录内
    pub fn is_protected(&self, target: &Path) -> bool {
        let roots = [
            normalize_lexically(&self.data_root),
            resolve_existing_prefix(&self.data_root),
        ];
        let targets = [normalize_lexically(target), resolve_existing_prefix(target)];
        roots.iter().any(|root| {
            targets.iter().any(|t| {
                let Ok(rel) = t.strip_prefix(root) else {
                    return false;
                };
                // rel = <user>/<protected...>
                let mut comps = rel.components();
                if comps.next().is_none() {
                    return false;
                }
                let under_user = comps.as_path();
                self.protected.iter().any(|p| under_user.starts_with(p))
            })
        })
    }

    pub fn check(&self, policy: &SecurityPolicy, target: &Path) -> Result<(), SecurityError> {
        if self.is_protected(target) {
            tracing::warn!(path = %target.display(), "write to protected directory refused");
            return Err(SecurityError {
                kind: SecurityErrorKind::WritePathDenied(target.display().to_string()),
                mode: policy.mode,
                role: policy.role,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{CognitiveMode, UserRole};
    use tempfile::TempDir;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/./c/../d")),
            PathBuf::from("/a/b/d")
        );
        assert_eq!(normalize_lexically(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_protected_dirs_for_any_user() {
        let dir = TempDir::new().unwrap();
        let guard = WritePathGuard::new(dir.path());
        assert!(guard.is_protected(&dir.path().join("alice/memory/episodic/x.json")));
        assert!(guard.is_protected(&dir.path().join("bob/persona/core.json")));
        assert!(guard.is_protected(&dir.path().join("alice/logs/audit/today.log")));
        assert!(!guard.is_protected(&dir.path().join("alice/logs/app.log")));
        assert!(!guard.is_protected(&dir.path().join("alice/tasks/active.json")));
        assert!(!guard.is_protected(&dir.path().join("alice/memoryish.txt")));
    }

    #[test]
    fn test_dotdot_escape_into_protected() {
        let dir = TempDir::new().unwrap();
        let guard = WritePathGuard::new(dir.path());
        let sneaky = dir.path().join("alice/workspace/../memory/notes.md");
        assert!(guard.is_protected(&sneaky));
        let policy = SecurityPolicy::new(CognitiveMode::Dual, UserRole::Owner);
        let err = guard.check(&policy, &sneaky).unwrap_err();
        assert!(matches!(err.kind, SecurityErrorKind::WritePathDenied(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_into_protected() {
        let dir = TempDir::new().unwrap();
        let memory = dir.path().join("alice/memory");
        std::fs::create_dir_all(&memory).unwrap();
        let ws = TempDir::new().unwrap();
        let link = ws.path().join("link");
        std::os::unix::fs::symlink(&memory, &link).unwrap();
        let guard = WritePathGuard::new(dir.path());
        assert!(guard.is_protected(&link.join("evil.json")));
    }
}
