//! 상태/진행률 피드
//!
//! 엔진은 UI 상태를 직접 들고 있지 않고, 주입된 `StatusSink`로 이벤트만 내보냅니다.
//! 이벤트 종류는 세 가지: `status(message)`, `progress(percent)`, `complete()`.
//!
//! 싱크 메서드는 전송 태스크 안에서 호출되므로 블로킹하면 안 됩니다.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// 리스너에게 전달되는 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StatusEvent {
    Status(String),
    /// 0–100
    Progress(u8),
    Complete,
}

/// 상태 피드 소비자 인터페이스
pub trait StatusSink: Send + Sync {
    fn status(&self, message: &str);
    fn progress(&self, percent: u8);
    fn complete(&self);
}

/// 이벤트를 버리는 싱크
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn status(&self, _message: &str) {}
    fn progress(&self, _percent: u8) {}
    fn complete(&self) {}
}

/// tokio broadcast 채널로 전달하는 싱크: 구독자가 없어도 송신은 블로킹하지 않는다
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<StatusEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: StatusEvent) {
        // 수신자가 없으면 Err: 무시
        let _ = self.tx.send(event);
    }
}

impl StatusSink for ChannelSink {
    fn status(&self, message: &str) {
        self.send(StatusEvent::Status(message.to_string()));
    }

    fn progress(&self, percent: u8) {
        self.send(StatusEvent::Progress(percent.min(100)));
    }

    fn complete(&self) {
        self.send(StatusEvent::Complete);
    }
}

/// 받은 이벤트를 순서대로 기록 (테스트/진단용)
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<StatusEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn progress_values(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StatusEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StatusEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn complete_count(&self) -> usize {
        self.events().iter().filter(|e| **e == StatusEvent::Complete).count()
    }

    fn push(&self, event: StatusEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl StatusSink for RecordingSink {
    fn status(&self, message: &str) {
        self.push(StatusEvent::Status(message.to_string()));
    }

    fn progress(&self, percent: u8) {
        self.push(StatusEvent::Progress(percent.min(100)));
    }

    fn complete(&self) {
        self.push(StatusEvent::Complete);
    }
}

/// 여러 싱크로 같은 이벤트를 복제
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl StatusSink for FanoutSink {
    fn status(&self, message: &str) {
        for s in &self.sinks {
            s.status(message);
        }
    }

    fn progress(&self, percent: u8) {
        for s in &self.sinks {
            s.progress(percent);
        }
    }

    fn complete(&self) {
        for s in &self.sinks {
            s.complete();
        }
    }
}
