//! 交付闸门：单个调用入站事件的串行化与终态去重。
//!
//! # 设计背景（Why）
//! - 管线不拥有调度器，入站事件可能从任意线程抵达；同一调用的回调之间
//!   必须严格有序，因此以单把自旋锁串行化全部交付；
//! - 终态“恰好一次”的保证在这里落地：首个终态胜出，后到者被丢弃并上报
//!   [`CallEventKind::DuplicateStatusDropped`] 事件，使拦截器作者的重复
//!   `next` 调用可被观测而非静默吞掉；
//! - 取消与真实终态的竞争同样在锁内裁决：谁先取得锁谁先交付，输家成为空操作，
//!   结果对外确定。

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::metadata::Metadata;
use crate::observability::{CallEvent, CallEventKind, SharedEventSink};
use crate::pipeline::handle::CallListener;
use crate::status::Status;

struct GateInner {
    listener: Box<dyn CallListener>,
    metadata_seen: bool,
    finished: bool,
}

/// 单个调用的交付闸门。
///
/// # 逻辑解析（How）
/// - 内部为 `Arc<Mutex<_>>`，克隆成本为常数，取消路径与入站路径共享同一实例；
/// - 交付顺序在锁内强制为 元数据 → 消息 → 终态：终态之后到达的元数据与消息
///   被直接丢弃（传输层契约不应产生它们，闸门兜底保证外层不可见）；
/// - 元数据与终态尾部元数据在交付前被冻结，监听器侧视为只读。
///
/// # 契约说明（What）
/// - [`cancel`](Self::cancel) 幂等：仅当尚无终态时合成一个 `CANCELLED` 终态，
///   重复取消与“终态已交付后的取消”均为空操作；
/// - [`listener`](Self::listener) 产出可交给内层链路的监听器适配，
///   任意多次调用产出的适配共享同一闸门状态。
#[derive(Clone)]
pub struct DeliveryGate {
    inner: Arc<Mutex<GateInner>>,
    sink: SharedEventSink,
    source: Cow<'static, str>,
}

impl DeliveryGate {
    /// 以外层监听器、事件接收器与来源标识构造闸门。
    pub fn new(
        listener: Box<dyn CallListener>,
        sink: SharedEventSink,
        source: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GateInner {
                listener,
                metadata_seen: false,
                finished: false,
            })),
            sink,
            source: source.into(),
        }
    }

    /// 交付入站元数据。终态之后或重复到达时丢弃。
    pub fn deliver_metadata(&self, mut metadata: Metadata) {
        let mut inner = self.inner.lock();
        if inner.finished || inner.metadata_seen {
            return;
        }
        inner.metadata_seen = true;
        metadata.freeze();
        inner.listener.on_metadata(metadata);
    }

    /// 交付入站消息。终态之后丢弃。
    pub fn deliver_message(&self, payload: Vec<u8>) {
        let mut inner = self.inner.lock();
        if inner.finished {
            return;
        }
        inner.listener.on_message(payload);
    }

    /// 交付终态。首个胜出；后到者被丢弃并上报事件。
    pub fn deliver_status(&self, mut status: Status) {
        let mut inner = self.inner.lock();
        if inner.finished {
            drop(inner);
            self.sink.record(
                CallEvent::new(CallEventKind::DuplicateStatusDropped, self.source.clone())
                    .with_note(Cow::Owned(alloc::format!(
                        "dropped duplicate terminal status {}",
                        status.code()
                    ))),
            );
            return;
        }
        inner.finished = true;
        status.freeze_trailers();
        inner.listener.on_status(status);
    }

    /// 请求取消：尚无终态时合成 `CANCELLED`，否则为空操作。
    ///
    /// 裁决与交付在同一次持锁内完成：输掉竞争的取消是纯空操作，
    /// 不会把自己合成的终态当作重复终态上报。
    pub fn cancel(&self, reason: &str) {
        {
            let mut inner = self.inner.lock();
            if inner.finished {
                return;
            }
            inner.finished = true;
            let mut status = Status::cancelled(Cow::Owned(reason.into()));
            status.freeze_trailers();
            inner.listener.on_status(status);
        }
        self.sink.record(CallEvent::new(
            CallEventKind::CancelRequested,
            self.source.clone(),
        ));
    }

    /// 查询终态是否已交付。
    pub fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }

    /// 产出共享本闸门的监听器适配，可交给内层链路。
    pub fn listener(&self) -> Box<dyn CallListener> {
        Box::new(GateListener { gate: self.clone() })
    }
}

struct GateListener {
    gate: DeliveryGate,
}

impl CallListener for GateListener {
    fn on_metadata(&mut self, metadata: Metadata) {
        self.gate.deliver_metadata(metadata);
    }

    fn on_message(&mut self, payload: Vec<u8>) {
        self.gate.deliver_message(payload);
    }

    fn on_status(&mut self, status: Status) {
        self.gate.deliver_status(status);
    }
}
