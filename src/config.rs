//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TWIN__*` 覆盖（双下划线表示嵌套，如 `TWIN__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::context::ContextSettings;
use crate::react::{EngineSettings, ReasoningDepth, ResponseStyle};
use crate::tools::guard::DEFAULT_PROTECTED_DIRS;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub reasoning: ReasoningSection,
    pub context: ContextSection,
    pub memory: MemorySection,
    pub tools: ToolsSection,
}

/// [app] 段：数据根目录与默认用户
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 每个用户的数据位于 `<data_root>/<user>/`
    pub data_root: PathBuf,
    pub user_id: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./profiles"),
            user_id: "owner".to_string(),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [reasoning] 段：推理深度、回复风格、scratchpad 截断
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReasoningSection {
    pub default_depth: ReasoningDepth,
    pub response_style: ResponseStyle,
    /// 旧条目每个字段保留的字符数
    pub observation_field_cap: usize,
    /// 最近若干条保持完整
    pub recent_entries_full: usize,
}

impl Default for ReasoningSection {
    fn default() -> Self {
        Self {
            default_depth: ReasoningDepth::Focused,
            response_style: ResponseStyle::Default,
            observation_field_cap: 600,
            recent_entries_full: 3,
        }
    }
}

/// [context] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    pub char_budget: usize,
    pub tool_lookback_days: i64,
    pub summary_lookback_days: i64,
    pub top_k: usize,
    pub default_threshold: f32,
    pub reflective_threshold: f32,
}

impl Default for ContextSection {
    fn default() -> Self {
        let d = ContextSettings::default();
        Self {
            char_budget: d.char_budget,
            tool_lookback_days: d.tool_lookback_days,
            summary_lookback_days: d.summary_lookback_days,
            top_k: d.top_k,
            default_threshold: d.default_threshold,
            reflective_threshold: d.reflective_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackend {
    #[default]
    File,
    Sqlite,
}

/// [memory] 段：情节记忆后端与会话摘要
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub backend: MemoryBackend,
    /// 摘要标记超过该秒数视为陈旧，可被覆盖
    pub summary_marker_timeout_secs: u64,
    pub summarize_after_messages: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::File,
            summary_marker_timeout_secs: 300,
            summarize_after_messages: 20,
        }
    }
}

/// [tools] 段：工具超时、工作区根、受保护目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// fs_* 技能的沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
    pub protected_dirs: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            workspace_root: None,
            protected_dirs: DEFAULT_PROTECTED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AppConfig {
    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            char_budget: self.context.char_budget,
            tool_lookback_days: self.context.tool_lookback_days,
            summary_lookback_days: self.context.summary_lookback_days,
            top_k: self.context.top_k,
            default_threshold: self.context.default_threshold,
            reflective_threshold: self.context.reflective_threshold,
            ..ContextSettings::default()
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            observation_field_cap: self.reasoning.observation_field_cap,
            recent_entries_full: self.reasoning.recent_entries_full,
            context_char_budget: self.context.char_budget,
        }
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.tools
            .workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("./workspace"))
    }
}

/// 从 config 目录加载配置，环境变量 TWIN__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TWIN__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TWIN")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.user_id, "owner");
        assert_eq!(cfg.reasoning.default_depth, ReasoningDepth::Focused);
        assert_eq!(cfg.memory.summary_marker_timeout_secs, 300);
        assert_eq!(cfg.tools.protected_dirs, vec!["memory", "persona", "logs/audit"]);
        assert_eq!(cfg.context_settings().top_k, 24);
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            f,
            "[reasoning]\ndefault_depth = \"deep\"\nresponse_style = \"strict\"\n\n[memory]\nbackend = \"sqlite\"\n\n[context]\nchar_budget = 1200"
        )
        .unwrap();
        let cfg = load_config(Some(f.path().to_path_buf())).unwrap();
        assert_eq!(cfg.reasoning.default_depth, ReasoningDepth::Deep);
        assert_eq!(cfg.reasoning.response_style, ResponseStyle::Strict);
        assert_eq!(cfg.memory.backend, MemoryBackend::Sqlite);
        assert_eq!(cfg.engine_settings().context_char_budget, 1200);
        assert_eq!(cfg.context.top_k, 24);
    }
}
