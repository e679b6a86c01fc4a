//! 调用事件：管线内部可观测性的统一出口。
//!
//! # 设计背景（Why）
//! - 交付闸门的去重、取消竞争裁决、拦截器的重试/缓存/回退决策都属于
//!   “调用结果之外”的关键事实，需要以结构化事件暴露给宿主的日志或指标系统；
//! - 核心保持 `no_std`，不绑定具体日志后端：宿主注入 [`EventSink`] 实现，
//!   默认使用 [`NoopEventSink`] 丢弃事件。

use alloc::borrow::Cow;
use alloc::sync::Arc;

/// 事件种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CallEventKind {
    /// 拦截器链装配完成。
    ChainAssembled,
    /// 调用已向传输层发起。
    CallStarted,
    /// 首个终态之后到达的重复终态被丢弃。
    DuplicateStatusDropped,
    /// 调用方请求取消。
    CancelRequested,
    /// 重试拦截器调度了一次新的内层尝试。
    RetryAttempt,
    /// 缓存拦截器命中，内层调用未被启动。
    CacheHit,
    /// 回退拦截器以合成响应掩盖了内层失败。
    FallbackEngaged,
}

/// 结构化调用事件。
///
/// # 契约说明（What）
/// - `source` 标注事件来源（通常为方法全名或拦截器名）；
/// - `note` 为可选补充说明，面向排障人员，不承载程序性语义。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallEvent {
    /// 事件种类。
    pub kind: CallEventKind,
    /// 事件来源标识。
    pub source: Cow<'static, str>,
    /// 可选补充说明。
    pub note: Option<Cow<'static, str>>,
}

impl CallEvent {
    /// 构造事件。
    pub fn new(kind: CallEventKind, source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            source: source.into(),
            note: None,
        }
    }

    /// 附带补充说明。
    pub fn with_note(mut self, note: impl Into<Cow<'static, str>>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// 事件接收器，由宿主实现并注入调用入口。
///
/// # 契约说明（What）
/// - `record` 必须快速返回且不得失败；耗时处理应在实现内部异步化；
/// - 实现需 `Send + Sync`，同一接收器会被多个并发调用共享。
pub trait EventSink: Send + Sync {
    /// 记录一条事件。
    fn record(&self, event: CallEvent);
}

/// 丢弃全部事件的默认接收器。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _event: CallEvent) {}
}

/// 共享事件接收器的统一别名。
pub type SharedEventSink = Arc<dyn EventSink>;
