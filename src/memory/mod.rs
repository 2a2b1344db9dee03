//! 记忆层：对话消息、情节记忆存储（文件 / SQLite）、语义索引接口、人格与任务快照、
//! 工具调用捕获与会话摘要

pub mod conversation;
pub mod episodic;
pub mod file_store;
pub mod invocation;
pub mod profile;
pub mod semantic;
pub mod sqlite_store;
pub mod summarizer;

pub use conversation::{render_transcript, Message, Role};
pub use episodic::{EpisodicRecord, EpisodicStore, Marker, MemoryType};
pub use file_store::FileEpisodicStore;
pub use invocation::{InvocationRecorder, ToolInvocation};
pub use profile::{JsonProfileStore, PersonaSummary, ProfileStore, TaskItem, TaskStatus};
pub use semantic::{IndexError, IndexHit, IndexItem, InMemoryIndex, ItemMetadata, SemanticIndex};
pub use sqlite_store::SqliteEpisodicStore;
pub use summarizer::{find_latest_summary, latest_summary, ConversationSummarizer, SummaryOutcome};
