//! 字符预算格式化：把上下文包渲染成一段可直接放入 prompt 的文本
//!
//! 每个段落有独立子预算，按优先级依次分配剩余总预算；超出时优先级最低的段落先被截断或丢弃。

use std::collections::HashMap;

use crate::context::ContextPackage;
use crate::policy;

/// 上下文段落（按优先级排序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextSection {
    Persona,
    /// 当前目标与模式
    Focus,
    Tasks,
    ToolHistory,
    Summary,
    Memories,
    Topics,
}

impl ContextSection {
    /// 数字越小优先级越高
    pub fn priority(&self) -> u8 {
        match self {
            ContextSection::Persona => 0,
            ContextSection::Focus => 1,
            ContextSection::Tasks => 2,
            ContextSection::ToolHistory => 3,
            ContextSection::Summary => 4,
            ContextSection::Memories => 5,
            ContextSection::Topics => 6,
        }
    }

    /// 默认子预算占总预算的百分比
    fn default_share(&self) -> usize {
        match self {
            ContextSection::Persona => 15,
            ContextSection::Focus => 10,
            ContextSection::Tasks => 15,
            ContextSection::ToolHistory => 20,
            ContextSection::Summary => 15,
            ContextSection::Memories => 40,
            ContextSection::Topics => 5,
        }
    }

    fn heading(&self) -> &'static str {
        match self {
            ContextSection::Persona => "## Persona",
            ContextSection::Focus => "## Current Focus",
            ContextSection::Tasks => "## Active Tasks",
            ContextSection::ToolHistory => "## Recent Tool Use",
            ContextSection::Summary => "## Conversation Summary",
            ContextSection::Memories => "## Relevant Memories",
            ContextSection::Topics => "## Recurring Topics",
        }
    }
}

const TRUNCATION_MARK: &str = "\n[truncated]";
const SECTION_SEPARATOR: &str = "\n\n";

/// 字符预算分配器
#[derive(Debug, Clone)]
pub struct CharBudget {
    total: usize,
    section_limits: HashMap<ContextSection, usize>,
}

impl CharBudget {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            section_limits: HashMap::new(),
        }
    }

    pub fn with_section_limit(mut self, section: ContextSection, limit: usize) -> Self {
        self.section_limits.insert(section, limit);
        self
    }

    fn limit_for(&self, section: ContextSection) -> usize {
        self.section_limits
            .get(&section)
            .copied()
            .unwrap_or(self.total * section.default_share() / 100)
    }

    /// 按优先级分配；返回顺序与输入顺序无关（按优先级）
    ///
    /// 标题行与段间空行也计入总预算，渲染结果整体不超过 total。
    pub fn allocate(&self, sections: &[(ContextSection, String)]) -> Vec<(ContextSection, String)> {
        let mut sorted: Vec<_> = sections.iter().filter(|(_, c)| !c.is_empty()).collect();
        sorted.sort_by_key(|(s, _)| s.priority());

        let mut remaining = self.total;
        let mut out = Vec::new();
        for (section, content) in sorted {
            let separator = if out.is_empty() { 0 } else { SECTION_SEPARATOR.len() };
            let overhead = section.heading().chars().count() + 1 + separator;
            let allowed = remaining
                .saturating_sub(overhead)
                .min(self.limit_for(*section));
            let len = content.chars().count();
            if len <= allowed {
                remaining -= overhead + len;
                out.push((*section, content.clone()));
            } else if allowed > TRUNCATION_MARK.len() {
                let truncated = truncate_chars(content, allowed);
                remaining = remaining.saturating_sub(overhead + truncated.chars().count());
                out.push((*section, truncated));
            } else {
                tracing::debug!(section = ?section, "context section dropped, budget exhausted");
            }
        }
        out
    }

    /// 分配后渲染为 `## 标题\n正文`，段间以空行分隔
    pub fn render(&self, sections: &[(ContextSection, String)]) -> String {
        self.allocate(sections)
            .into_iter()
            .map(|(section, body)| format!("{}\n{}", section.heading(), body))
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR)
    }
}

/// 截断到 max 个字符以内（含截断标记）
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(TRUNCATION_MARK.len());
    let head: String = text.chars().take(keep).collect();
    format!("{}{}", head.trim_end(), TRUNCATION_MARK)
}

fn persona_section(pkg: &ContextPackage) -> String {
    let p = &pkg.persona;
    if p.is_empty() {
        return String::new();
    }
    let mut lines = Vec::new();
    if !p.name.is_empty() {
        lines.push(format!("Name: {}", p.name));
    }
    if !p.identity.is_empty() {
        lines.push(format!("Identity: {}", p.identity));
    }
    if !p.core_values.is_empty() {
        lines.push(format!("Values: {}", p.core_values.join(", ")));
    }
    if !p.communication_style.is_empty() {
        lines.push(format!("Style: {}", p.communication_style));
    }
    lines.join("\n")
}

fn tool_history_section(pkg: &ContextPackage) -> String {
    pkg.recent_tools
        .iter()
        .map(|t| {
            let status = if t.success { "ok" } else { "failed" };
            let mut line = format!(
                "- {} [{}] {} inputs={}",
                t.timestamp.format("%Y-%m-%d %H:%M"),
                status,
                t.tool_name,
                t.inputs
            );
            if let Some(err) = &t.error {
                line.push_str(&format!(" error={err}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn memories_section(pkg: &ContextPackage) -> String {
    pkg.memories
        .iter()
        .map(|m| {
            let kind = m.kind.map(|k| k.as_str()).unwrap_or("memory");
            format!("- ({kind}, {:.2}) {}", m.score, m.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn topics_section(pkg: &ContextPackage) -> String {
    if pkg.recent_topics.is_empty() {
        return String::new();
    }
    let mut s = format!("Topics: {}", pkg.recent_topics.join(", "));
    for p in &pkg.patterns {
        s.push_str(&format!("\n- {} (x{})", p.pattern, p.frequency));
    }
    s
}

/// 渲染上下文包；输出按 viewer 角色脱敏
pub fn format_context(
    pkg: &ContextPackage,
    query: &str,
    role: policy::UserRole,
    budget: &CharBudget,
) -> String {
    let focus = format!("Mode: {}\nGoal: {}", pkg.mode, query.trim());
    let tasks = pkg
        .active_tasks
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n");
    // 先脱敏再分配：占位符可能比原文长，放在截断之后会撑破预算
    let sections: Vec<_> = [
        (ContextSection::Persona, persona_section(pkg)),
        (ContextSection::Focus, focus),
        (ContextSection::Tasks, tasks),
        (ContextSection::ToolHistory, tool_history_section(pkg)),
        (
            ContextSection::Summary,
            pkg.conversation_summary.clone().unwrap_or_default(),
        ),
        (ContextSection::Memories, memories_section(pkg)),
        (ContextSection::Topics, topics_section(pkg)),
    ]
    .into_iter()
    .map(|(section, body)| (section, policy::redact_sensitive_data(&body, role)))
    .collect();

    budget.render(&sections)
}
