//! 沙箱文件系统技能
//!
//! SafeFs 绑定工作区根目录，所有路径必须解析到根下（禁止 ../ 与符号链接逃逸）；
//! fs_read / fs_list 只读，fs_write 为变更类技能，执行前还要经过写路径白名单。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{RequestContext, SkillError, SkillErrorCode};
use crate::tools::guard::resolve_existing_prefix;
use crate::tools::registry::{RiskLevel, Skill, SkillCategory};

/// 单次读取的最大字节数
const MAX_READ_BYTES: u64 = 256 * 1024;

#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 解析到根下；目标可以尚不存在（写入用）
    pub fn resolve(&self, path: &str) -> Result<PathBuf, SkillError> {
        let rel = path.trim_start_matches("./");
        let joined = if Path::new(rel).is_absolute() {
            PathBuf::from(rel)
        } else {
            self.root_dir.join(rel)
        };
        let resolved = resolve_existing_prefix(&joined);
        let root = resolve_existing_prefix(&self.root_dir);
        if resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            Err(SkillError::new(
                SkillErrorCode::PermissionDenied,
                format!("path escapes workspace: {path}"),
            )
            .with_context(json!({ "path": path })))
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, SkillError> {
        let resolved = self.resolve(path)?;
        let meta = std::fs::metadata(&resolved).map_err(|e| io_error(path, e))?;
        if meta.len() > MAX_READ_BYTES {
            return Err(SkillError::new(
                SkillErrorCode::InvalidInput,
                format!("{path} is too large ({} bytes)", meta.len()),
            ));
        }
        std::fs::read_to_string(&resolved).map_err(|e| io_error(path, e))
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, SkillError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base).map_err(|e| io_error(path, e))? {
            let e = e.map_err(|e| io_error(path, e))?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let suffix = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{name}{suffix}"));
            }
        }
        entries.sort();
        Ok(entries)
    }

    pub fn write_file(&self, path: &str, content: &str, overwrite: bool) -> Result<usize, SkillError> {
        let resolved = self.resolve(path)?;
        if resolved.exists() && !overwrite {
            return Err(SkillError::new(
                SkillErrorCode::InvalidInput,
                format!("{path} already exists; pass overwrite=true to replace it"),
            ));
        }
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;
        }
        std::fs::write(&resolved, content).map_err(|e| io_error(path, e))?;
        Ok(content.len())
    }
}

fn io_error(path: &str, e: std::io::Error) -> SkillError {
    let code = match e.kind() {
        std::io::ErrorKind::NotFound => SkillErrorCode::FileNotFound,
        std::io::ErrorKind::PermissionDenied => SkillErrorCode::PermissionDenied,
        _ => SkillErrorCode::classify(&e.to_string()),
    };
    SkillError::new(code, format!("{path}: {e}")).with_context(json!({ "path": path }))
}

fn str_arg<'a>(inputs: &'a Value, key: &str, default: &'a str) -> &'a str {
    inputs.get(key).and_then(|v| v.as_str()).unwrap_or(default)
}

async fn run_blocking<T, F>(f: F) -> Result<T, SkillError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SkillError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SkillError::new(SkillErrorCode::Unknown, e.to_string()))?
}

pub struct FsReadSkill {
    fs: SafeFs,
}

impl FsReadSkill {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Skill for FsReadSkill {
    fn name(&self) -> &str {
        "fs_read"
    }

    fn description(&self) -> &str {
        "Read a text file from the workspace. Args: {\"path\": \"file path relative to workspace\"}"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" }, "content": { "type": "string" } }
        })
    }

    fn category(&self) -> SkillCategory {
        SkillCategory::Retrieval
    }

    async fn execute(&self, _ctx: &RequestContext, inputs: Value) -> Result<Value, SkillError> {
        let path = str_arg(&inputs, "path", "").to_string();
        tracing::info!(path = %path, "fs_read");
        let fs = self.fs.clone();
        let p = path.clone();
        let content = run_blocking(move || fs.read_file(&p)).await?;
        Ok(json!({ "path": path, "content": content }))
    }
}

pub struct FsListSkill {
    fs: SafeFs,
}

impl FsListSkill {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Skill for FsListSkill {
    fn name(&self) -> &str {
        "fs_list"
    }

    fn description(&self) -> &str {
        "List a workspace directory. Args: {\"path\": \"directory path, default '.'\"}"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": []
        })
    }

    fn category(&self) -> SkillCategory {
        SkillCategory::Retrieval
    }

    async fn execute(&self, _ctx: &RequestContext, inputs: Value) -> Result<Value, SkillError> {
        let path = str_arg(&inputs, "path", ".").to_string();
        let fs = self.fs.clone();
        let p = path.clone();
        let entries = run_blocking(move || fs.list_dir(&p)).await?;
        Ok(json!({ "path": path, "entries": entries, "count": entries.len() }))
    }
}

pub struct FsWriteSkill {
    fs: SafeFs,
}

impl FsWriteSkill {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Skill for FsWriteSkill {
    fn name(&self) -> &str {
        "fs_write"
    }

    fn description(&self) -> &str {
        "Write a text file in the workspace. Args: {\"path\": \"...\", \"content\": \"...\", \"overwrite\": false}"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" },
                "overwrite": { "type": "boolean" }
            },
            "required": ["path", "content"]
        })
    }

    fn category(&self) -> SkillCategory {
        SkillCategory::Mutation
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Medium
    }

    fn write_targets(&self, _ctx: &RequestContext, inputs: &Value) -> Vec<PathBuf> {
        let path = str_arg(inputs, "path", "");
        let rel = path.trim_start_matches("./");
        if Path::new(rel).is_absolute() {
            vec![PathBuf::from(rel)]
        } else {
            vec![self.fs.root().join(rel)]
        }
    }

    async fn execute(&self, _ctx: &RequestContext, inputs: Value) -> Result<Value, SkillError> {
        let path = str_arg(&inputs, "path", "").to_string();
        let content = str_arg(&inputs, "content", "").to_string();
        let overwrite = inputs
            .get("overwrite")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let fs = self.fs.clone();
        let p = path.clone();
        let bytes = run_blocking(move || fs.write_file(&p, &content, overwrite)).await?;
        Ok(json!({ "path": path, "bytes_written": bytes }))
    }
}
