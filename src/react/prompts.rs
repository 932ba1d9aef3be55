//! Prompt 模板
//!
//! 每个 user prompt 由若干 `## 标题` 段组成；section() 按标题取回段落内容（Mock Provider 与测试桩依赖它）。

use crate::core::{ActionResult, SharedState};
use crate::llm::{PromptPurpose, PromptSpec};

pub const OBJECTIVE_HEADER: &str = "Objective";
pub const INSTRUCTION_HEADER: &str = "Output instruction";
pub const TASK_HEADER: &str = "Task";
pub const RESULTS_HEADER: &str = "Results";
pub const TOOLS_HEADER: &str = "Available tools";
pub const TOOL_OUTPUT_HEADER: &str = "Tool output";
pub const PENDING_HEADER: &str = "Pending tasks";
pub const REASON_HEADER: &str = "Replan reason";
pub const BUDGET_HEADER: &str = "Budget";

/// 结果摘录最大字符数（拼入后续 prompt 时）
const RESULT_EXCERPT_CHARS: usize = 1500;

const PLANNER_SYSTEM: &str = "You are a meticulous task planner. Break the user's objective into a short, \
ordered list of concrete tasks. Each task must be executable on its own by an assistant that can answer \
directly or call a tool such as web search. Respond with JSON only: {\"tasks\": [\"task 1\", \"task 2\"]}.";

const REPLANNER_SYSTEM: &str = "You are a task planner revising a plan that is already under way. \
Completed work is kept; only list the tasks that still need to run, in order. Reuse the exact wording \
of a pending task when it should stay. Respond with JSON only: {\"tasks\": [\"...\"]}.";

const ACTION_SYSTEM: &str = "You execute exactly one task of a larger plan. If a tool is needed, reply \
with ONLY one JSON object {\"tool\": \"<name>\", \"args\": {...}} using a listed tool. Otherwise reply \
with the complete result of the task as plain text.";

const COMPOSE_SYSTEM: &str = "You turn raw tool output into the finished result of one task. \
Keep facts from the tool output, drop noise, and answer the task directly.";

const JUDGE_SYSTEM: &str = "You judge whether an objective has been fully achieved by the results so far. \
Respond with JSON only: {\"complete\": true|false, \"reason\": \"one sentence\"}.";

const ENHANCE_SYSTEM: &str = "You write the final answer for the user from the task results below. \
Follow the output instruction exactly.";

const ENHANCE_SYSTEM_EXTENDED: &str = "You are a senior editor producing the final deliverable for the user. \
Synthesize all task results into one coherent, complete answer: merge overlapping content, resolve \
contradictions in favour of the most specific result, keep concrete details (names, numbers, examples), \
and fill small gaps with clearly reasonable content. Follow the output instruction exactly, including \
language and section structure. Do not mention tasks, tools or the planning process.";

/// 取出 `## {header}` 段落（到下一个 `## ` 标题或结尾），去掉首尾空白
pub fn section<'a>(text: &'a str, header: &str) -> Option<&'a str> {
    let marker = format!("## {header}\n");
    let start = if text.starts_with(&marker) {
        marker.len()
    } else {
        text.find(&format!("\n{marker}"))? + marker.len() + 1
    };
    let rest = &text[start..];
    let end = rest.find("\n## ").unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn push_section(out: &mut String, header: &str, body: &str) {
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str("## ");
    out.push_str(header);
    out.push('\n');
    out.push_str(body.trim());
}

fn excerpt(text: &str) -> String {
    if text.chars().count() > RESULT_EXCERPT_CHARS {
        format!(
            "{}...",
            text.chars().take(RESULT_EXCERPT_CHARS).collect::<String>()
        )
    } else {
        text.to_string()
    }
}

fn objective_block(out: &mut String, objective: &str, output_instruction: &str) {
    push_section(out, OBJECTIVE_HEADER, objective);
    if !output_instruction.trim().is_empty() {
        push_section(out, INSTRUCTION_HEADER, output_instruction);
    }
}

/// 结果列表：编号、状态、摘录；full=true 时不截断
pub fn format_results(results: &[ActionResult], full: bool) -> String {
    if results.is_empty() {
        return "(no results yet)".to_string();
    }
    results
        .iter()
        .map(|r| {
            let status = if r.success { "done" } else { "FAILED" };
            let content = if full {
                r.content.clone()
            } else {
                excerpt(&r.content)
            };
            format!("### Task {} [{}]: {}\n{}", r.task_index, status, r.task, content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn breakdown_prompt(objective: &str, output_instruction: &str, budget: usize) -> PromptSpec {
    let mut user = String::new();
    objective_block(&mut user, objective, output_instruction);
    push_section(
        &mut user,
        BUDGET_HEADER,
        &format!("Plan at most {budget} tasks."),
    );
    PromptSpec::new(PromptPurpose::Breakdown, PLANNER_SYSTEM, user)
        .with_json()
        .with_temperature(0.2)
}

pub fn replan_prompt(
    objective: &str,
    output_instruction: &str,
    state: &SharedState,
    reason: &str,
    remaining: usize,
) -> PromptSpec {
    let mut user = String::new();
    objective_block(&mut user, objective, output_instruction);
    push_section(&mut user, RESULTS_HEADER, &format_results(state.action_results(), false));
    let pending: Vec<String> = state
        .plan()
        .pending()
        .map(|t| format!("- {}", t.description))
        .collect();
    push_section(
        &mut user,
        PENDING_HEADER,
        &if pending.is_empty() {
            "(none)".to_string()
        } else {
            pending.join("\n")
        },
    );
    push_section(&mut user, REASON_HEADER, reason);
    push_section(
        &mut user,
        BUDGET_HEADER,
        &format!("At most {remaining} more tasks can run."),
    );
    PromptSpec::new(PromptPurpose::Replan, REPLANNER_SYSTEM, user)
        .with_json()
        .with_temperature(0.2)
}

pub fn decide_prompt(
    objective: &str,
    task: &str,
    results: &[ActionResult],
    tools_json: Option<&str>,
) -> PromptSpec {
    let mut user = String::new();
    push_section(&mut user, OBJECTIVE_HEADER, objective);
    push_section(&mut user, TASK_HEADER, task);
    push_section(&mut user, RESULTS_HEADER, &format_results(results, false));
    let system = match tools_json {
        Some(tools) => {
            push_section(&mut user, TOOLS_HEADER, tools);
            format!(
                "{ACTION_SYSTEM}\n\nTool call JSON Schema:\n```json\n{}\n```",
                crate::tools::tool_call_schema_json()
            )
        }
        None => ACTION_SYSTEM.to_string(),
    };
    PromptSpec::new(PromptPurpose::Decide, system, user)
}

pub fn compose_prompt(objective: &str, task: &str, tool: &str, tool_output: &str) -> PromptSpec {
    let mut user = String::new();
    push_section(&mut user, OBJECTIVE_HEADER, objective);
    push_section(&mut user, TASK_HEADER, task);
    push_section(
        &mut user,
        TOOL_OUTPUT_HEADER,
        &format!("(from {tool})\n{tool_output}"),
    );
    PromptSpec::new(PromptPurpose::Compose, COMPOSE_SYSTEM, user)
}

pub fn judge_prompt(objective: &str, output_instruction: &str, results: &[ActionResult]) -> PromptSpec {
    let mut user = String::new();
    objective_block(&mut user, objective, output_instruction);
    push_section(&mut user, RESULTS_HEADER, &format_results(results, false));
    PromptSpec::new(PromptPurpose::Judge, JUDGE_SYSTEM, user)
        .with_json()
        .with_temperature(0.0)
}

pub fn enhance_prompt(
    objective: &str,
    output_instruction: &str,
    results: &[ActionResult],
    extended: bool,
) -> PromptSpec {
    let mut user = String::new();
    objective_block(&mut user, objective, output_instruction);
    push_section(&mut user, RESULTS_HEADER, &format_results(results, true));
    let system = if extended {
        ENHANCE_SYSTEM_EXTENDED
    } else {
        ENHANCE_SYSTEM
    };
    PromptSpec::new(PromptPurpose::Enhance, system, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_roundtrip() {
        let p = breakdown_prompt("find persona", "Use sections", 4);
        assert_eq!(section(&p.user, OBJECTIVE_HEADER), Some("find persona"));
        assert_eq!(section(&p.user, INSTRUCTION_HEADER), Some("Use sections"));
        assert_eq!(section(&p.user, BUDGET_HEADER), Some("Plan at most 4 tasks."));
        assert_eq!(section(&p.user, TASK_HEADER), None);
        assert!(p.json_mode);
    }

    #[test]
    fn test_empty_instruction_omitted() {
        let p = breakdown_prompt("goal", "  ", 3);
        assert!(section(&p.user, INSTRUCTION_HEADER).is_none());
    }

    #[test]
    fn test_decide_prompt_includes_tools_only_when_present() {
        let with = decide_prompt("goal", "search", &[], Some("[{\"name\":\"web_search\"}]"));
        assert!(section(&with.user, TOOLS_HEADER).unwrap().contains("web_search"));
        assert!(with.system.contains("JSON Schema"));

        let without = decide_prompt("goal", "write", &[], None);
        assert!(section(&without.user, TOOLS_HEADER).is_none());
        assert_eq!(section(&without.user, TASK_HEADER), Some("write"));
    }

    #[test]
    fn test_enhance_prompt_variants() {
        let plain = enhance_prompt("goal", "", &[], false);
        let extended = enhance_prompt("goal", "", &[], true);
        assert_ne!(plain.system, extended.system);
        assert_eq!(section(&plain.user, RESULTS_HEADER), Some("(no results yet)"));
    }
}
