//! 生命周期事件：taskBreakdown / taskReplan / finalEnhancement
//!
//! 两种消费方式：构建期注册的同步监听器（在发出点立即执行），以及 subscribe() 得到的 mpsc 通道
//! （供前端流式展示）。同一次 invoke 内事件顺序为 taskBreakdown < taskReplan* < finalEnhancement。

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::TaskPlan;

/// 事件种类（对外名称为 camelCase）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    TaskBreakdown,
    TaskReplan,
    FinalEnhancement,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::TaskBreakdown => "taskBreakdown",
            EventKind::TaskReplan => "taskReplan",
            EventKind::FinalEnhancement => "finalEnhancement",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 事件数据：计划或最终结论
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    Plan(TaskPlan),
    Conclusion(String),
}

impl EventData {
    pub fn plan(&self) -> Option<&TaskPlan> {
        match self {
            EventData::Plan(p) => Some(p),
            EventData::Conclusion(_) => None,
        }
    }

    pub fn conclusion(&self) -> Option<&str> {
        match self {
            EventData::Conclusion(c) => Some(c),
            EventData::Plan(_) => None,
        }
    }
}

/// 交给监听器的负载
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPayload {
    pub agent: String,
    pub data: EventData,
}

/// 通道订阅者收到的完整事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    pub run_id: String,
    pub kind: EventKind,
    #[serde(flatten)]
    pub payload: EventPayload,
}

pub type Listener = dyn Fn(&EventPayload) + Send + Sync;

/// 事件总线：监听器构建后只读，订阅通道可随时追加
#[derive(Default)]
pub struct EventBus {
    agent: String,
    listeners: Vec<(EventKind, Arc<Listener>)>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<AgentEvent>>>,
}

impl EventBus {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            listeners: Vec::new(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn on(&mut self, kind: EventKind, listener: Arc<Listener>) {
        self.listeners.push((kind, listener));
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.iter().filter(|(k, _)| *k == kind).count()
    }

    /// 新建订阅通道；接收端丢弃后下次发送时自动移除
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// 同步调用匹配的监听器，再广播给订阅者
    pub fn emit(&self, run_id: &str, kind: EventKind, data: EventData) {
        let payload = EventPayload {
            agent: self.agent.clone(),
            data,
        };
        tracing::debug!(run_id, event = %kind, "emit event");
        for (k, listener) in &self.listeners {
            if *k == kind {
                listener(&payload);
            }
        }
        if let Ok(mut subs) = self.subscribers.lock() {
            if subs.is_empty() {
                return;
            }
            let event = AgentEvent {
                run_id: run_id.to_string(),
                kind,
                payload,
            };
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("agent", &self.agent)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listeners_filtered_by_kind() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new("tester");
        let s = seen.clone();
        bus.on(
            EventKind::FinalEnhancement,
            Arc::new(move |p: &EventPayload| {
                s.lock().unwrap().push(p.data.conclusion().unwrap_or("").to_string());
            }),
        );
        bus.emit("r1", EventKind::TaskBreakdown, EventData::Plan(TaskPlan::default()));
        bus.emit("r1", EventKind::FinalEnhancement, EventData::Conclusion("done".into()));
        assert_eq!(*seen.lock().unwrap(), vec!["done".to_string()]);
        assert_eq!(bus.listener_count(EventKind::FinalEnhancement), 1);
        assert_eq!(bus.listener_count(EventKind::TaskReplan), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new("tester");
        let mut rx = bus.subscribe();
        bus.emit("r1", EventKind::TaskBreakdown, EventData::Plan(TaskPlan::default()));
        bus.emit("r1", EventKind::FinalEnhancement, EventData::Conclusion("c".into()));
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::TaskBreakdown);
        assert_eq!(second.kind, EventKind::FinalEnhancement);
        assert_eq!(second.payload.agent, "tester");
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new("tester");
        drop(bus.subscribe());
        bus.emit("r1", EventKind::TaskReplan, EventData::Plan(TaskPlan::default()));
        assert!(bus.subscribers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_event_json_shape() {
        let event = AgentEvent {
            run_id: "r1".into(),
            kind: EventKind::FinalEnhancement,
            payload: EventPayload {
                agent: "a".into(),
                data: EventData::Conclusion("text".into()),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "finalEnhancement");
        assert_eq!(json["data"], "text");
        assert_eq!(json["agent"], "a");
    }
}
