//! Twin 命令行入口
//!
//! 参数以空格拼接为目标，以 owner 身份、dual 模式运行一次推理并打印回复。

use std::sync::Arc;

use anyhow::Context;
use twin::agent::{create_llm_from_config, process_goal, AgentComponents};
use twin::config::load_config;
use twin::core::RequestContext;
use twin::policy::{CognitiveMode, UserRole};
use twin::react::RunResult;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    twin::observability::init();

    let goal = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if goal.trim().is_empty() {
        anyhow::bail!("usage: twin <goal...>");
    }

    let cfg = load_config(None).context("Failed to load config")?;
    let llm = create_llm_from_config(&cfg);
    let components =
        AgentComponents::from_config(&cfg, Arc::clone(&llm)).context("Failed to build agent")?;

    let ctx = RequestContext::new(cfg.app.user_id.clone(), UserRole::Owner, CognitiveMode::Dual)
        .with_conversation(uuid::Uuid::new_v4().to_string());
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = process_goal(&components, &ctx, &goal).await;
    tracing::info!(
        steps = outcome.metadata.steps,
        llm_calls = outcome.metadata.llm_calls,
        tool_calls = outcome.metadata.tool_calls,
        "run complete"
    );
    match outcome.result {
        RunResult::Completed { response } => println!("{response}"),
        RunResult::Stuck { reason, suggestion } => {
            println!("{reason}\n{suggestion}");
        }
        RunResult::Cancelled => eprintln!("cancelled"),
        RunResult::Error { message } => anyhow::bail!(message),
    }
    Ok(())
}
