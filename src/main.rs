//! react-agent 演示入口
//!
//! 读取配置与环境变量中的 Key，运行一次目标并打印事件与结论；Ctrl-C 取消并以已有结果收尾。
//! 用法：react-agent [目标文本]（缺省为内置的内容策划示例）

use std::time::Instant;

use anyhow::Context;
use react_agent::config::load_config;
use react_agent::{AgentBuilder, EventKind, EventPayload, Invocation};
use tokio_util::sync::CancellationToken;

const DEFAULT_OBJECTIVE: &str = "Use this workflow: find persona and pain for new product regarding \
Jeans Denim for young adults -> create 3 hooks -> elaborate those hooks into stories and caption -> \
make a complete content planner with that 3 hooks in Bahasa Indonesia";

const DEFAULT_INSTRUCTION: &str = "Present it in structured sections: Persona (Demographic, \
Psychographic, Pain Points), Hooks, Stories, Content Planner";

fn print_event(kind: EventKind) -> impl Fn(&EventPayload) + Send + Sync + 'static {
    move |payload: &EventPayload| match payload.data.plan() {
        Some(plan) => {
            println!("[{kind}] {} (plan v{}):", payload.agent, plan.version);
            for task in &plan.tasks {
                println!("  {:>2}. [{:?}] {}", task.index, task.status, task.description);
            }
        }
        None => println!(
            "[{kind}] {}: {} chars",
            payload.agent,
            payload.data.conclusion().map_or(0, str::len)
        ),
    }
}

/// 未在配置中给出的 Key 从常用环境变量补齐
fn fill_from_env(slot: &mut Option<String>, var: &str) {
    if slot.is_none() {
        *slot = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cfg = load_config(None).context("Failed to load config")?;
    react_agent::observability::init(cfg.agent.debug);

    let creds = &mut cfg.credentials;
    fill_from_env(&mut creds.gemini_key, "GEMINI_KEY");
    fill_from_env(&mut creds.openai_key, "OPENAI_KEY");
    fill_from_env(&mut creds.brave_api_key, "BRAVE_API_KEY");
    fill_from_env(&mut creds.openrouter_key, "OPENROUTER_KEY");
    if cfg.agent.selected_provider == "mock" && cfg.credentials.gemini_key.is_some() {
        cfg.agent.selected_provider = "gemini".to_string();
        cfg.agent.model = "gemini-2.5-flash".to_string();
    }

    let agent = AgentBuilder::from_config(&cfg)
        .on(EventKind::TaskBreakdown, print_event(EventKind::TaskBreakdown))
        .on(EventKind::TaskReplan, print_event(EventKind::TaskReplan))
        .on(EventKind::FinalEnhancement, print_event(EventKind::FinalEnhancement))
        .build()
        .context("Failed to build agent")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = if args.is_empty() {
        Invocation::new(DEFAULT_OBJECTIVE).with_output_instruction(DEFAULT_INSTRUCTION)
    } else {
        Invocation::new(args.join(" "))
    };

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, cancelling");
            on_ctrl_c.cancel();
        }
    });

    let started = Instant::now();
    let outcome = agent
        .invoke_with_cancel(invocation, cancel)
        .await
        .context("Agent run failed")?;

    let state = &outcome.full_state;
    println!("\nDuration: {}ms", started.elapsed().as_millis());
    println!("Stop reason: {:?}", outcome.stop_reason);
    println!("Steps: {}/{}", state.step(), state.max_tasks());
    println!("Action results: {}", state.action_results().len());
    for result in state.action_results() {
        println!("{result}\n##");
    }
    let (prompt, completion, total) = agent.token_usage();
    if total > 0 {
        println!("Tokens: prompt={prompt} completion={completion} total={total}");
    }
    println!("\nConclusion:\n{}\n{}", "-".repeat(40), outcome.conclusion);
    Ok(())
}
