//! TaskPlanner：把目标拆解为有序任务列表
//!
//! 调用 Provider 得到 `{"tasks": [...]}`（或裸数组）；parse_task_list 先从 ```json 块或最外层括号中提取 JSON，
//! JSON 给不出任务时退回编号 / 项目符号列表。空白与重复描述会被去掉，结果为空即 PlanningError。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::{PlanningError, TaskPlan};
use crate::llm::ModelRoute;
use crate::react::prompts;

/// 从文本中提取 JSON 片段：```json 块优先，其次是最先出现的 { 或 [ 到对应的最后一个 } 或 ]
fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let open = text.find(['{', '['])?;
    let close = if text[open..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > open).then(|| &text[open..=end])
}

fn entry_description(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("description")
            .or_else(|| map.get("task"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn tasks_from_json(value: &Value) -> Option<Vec<String>> {
    let entries = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.get("tasks")?.as_array()?,
        _ => return None,
    };
    Some(entries.iter().filter_map(entry_description).collect())
}

fn list_item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:\d+\s*[.)]|[-*•])\s+(.+?)\s*$").expect("static list item regex")
    })
}

fn tasks_from_list(text: &str) -> Vec<String> {
    list_item_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// 去掉空白、包裹的引号与重复项，保持原顺序
fn clean(descriptions: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    descriptions
        .into_iter()
        .map(|d| d.trim().trim_matches('"').trim().to_string())
        .filter(|d| !d.is_empty() && seen.insert(d.clone()))
        .collect()
}

/// 解析 Provider 返回的任务列表
///
/// JSON 给不出任务（形状不对或条目全空）时仍尝试编号列表，列表项里夹带的 `[..]` / `{..}` 不会挡住回退
pub fn parse_task_list(output: &str) -> Result<Vec<String>, PlanningError> {
    let trimmed = output.trim();
    let json = extract_json(trimmed).and_then(|s| serde_json::from_str::<Value>(s).ok());
    let from_json = json.as_ref().and_then(tasks_from_json).map(clean);
    if let Some(tasks) = from_json.as_ref().filter(|t| !t.is_empty()) {
        return Ok(tasks.clone());
    }

    let from_list = clean(tasks_from_list(trimmed));
    if !from_list.is_empty() {
        return Ok(from_list);
    }
    match (json, from_json) {
        (_, Some(_)) => Err(PlanningError::EmptyPlan),
        (Some(value), None) => Err(PlanningError::Malformed(format!(
            "expected {{\"tasks\": [...]}}, got: {value}"
        ))),
        (None, None) if trimmed.is_empty() => Err(PlanningError::EmptyPlan),
        (None, None) => Err(PlanningError::Malformed(format!(
            "no task list found in: {}",
            trimmed.chars().take(200).collect::<String>()
        ))),
    }
}

/// 任务规划器：持有模型路由，只读、可在并发 invoke 间共享
#[derive(Clone)]
pub struct TaskPlanner {
    route: ModelRoute,
}

impl TaskPlanner {
    pub fn new(route: ModelRoute) -> Self {
        Self { route }
    }

    /// 生成版本 1 的计划（编号从 1 开始）。预算只写入 prompt，任务数由执行期预算约束
    pub async fn breakdown(
        &self,
        objective: &str,
        output_instruction: &str,
        budget: usize,
    ) -> Result<TaskPlan, PlanningError> {
        if objective.trim().is_empty() {
            return Err(PlanningError::EmptyObjective);
        }
        let prompt = prompts::breakdown_prompt(objective, output_instruction, budget);
        let output = self.route.complete(&prompt).await?;
        let tasks = parse_task_list(&output)?;
        tracing::info!(
            provider = self.route.provider(),
            tasks = tasks.len(),
            budget,
            "task breakdown"
        );
        Ok(TaskPlan::new(1, tasks, 1))
    }

    pub fn route(&self) -> &ModelRoute {
        &self.route
    }
}
