//! 记录型桩：监听器、事件接收器与带标签的追踪拦截器。

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::descriptor::{CallDescriptor, WriteFlags};
use crate::metadata::Metadata;
use crate::observability::{CallEvent, CallEventKind, EventSink};
use crate::pipeline::chain::{CallInterceptor, InterceptorDescriptor};
use crate::pipeline::handle::{CallFactory, CallHandle, CallListener};
use crate::pipeline::intercepting::{InterceptingCall, ListenerOverride, Requester};
use crate::status::Status;

/// 多个桩共享的时间序日志。
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// 创建空日志。
pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// 把收到的每个入站事件记入日志的监听器。
pub struct RecordingListener {
    label: &'static str,
    log: EventLog,
}

impl RecordingListener {
    /// 以标签与共享日志构造。
    pub fn new(label: &'static str, log: EventLog) -> Self {
        Self { label, log }
    }
}

impl CallListener for RecordingListener {
    fn on_metadata(&mut self, _metadata: Metadata) {
        self.log.lock().push(format!("metadata {}", self.label));
    }

    fn on_message(&mut self, _payload: Vec<u8>) {
        self.log.lock().push(format!("message {}", self.label));
    }

    fn on_status(&mut self, status: Status) {
        self.log
            .lock()
            .push(format!("status {} {}", self.label, status.code()));
    }
}

/// 把事件种类记入共享向量的事件接收器。
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<CallEventKind>>>,
}

impl RecordingSink {
    /// 创建空接收器。
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回已记录事件种类的快照。
    pub fn kinds(&self) -> Vec<CallEventKind> {
        self.events.lock().clone()
    }

    /// 统计某一种类出现的次数。
    pub fn count(&self, kind: CallEventKind) -> usize {
        self.events.lock().iter().filter(|k| **k == kind).count()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: CallEvent) {
        self.events.lock().push(event.kind);
    }
}

/// 带标签的追踪拦截器：在构造与每个出站/入站钩子处写日志，自身不改写任何事件。
///
/// 用于验证洋葱顺序：构造与出站自外向内，入站自内向外。
pub struct LabelInterceptor {
    label: &'static str,
    log: EventLog,
}

impl LabelInterceptor {
    /// 以标签与共享日志构造。
    pub fn new(label: &'static str, log: EventLog) -> Self {
        Self { label, log }
    }
}

impl CallInterceptor for LabelInterceptor {
    fn descriptor(&self) -> InterceptorDescriptor {
        InterceptorDescriptor::new("label", "testing", "记录生命周期事件的追踪拦截器")
    }

    fn intercept(
        &self,
        descriptor: &CallDescriptor,
        next: Arc<dyn CallFactory>,
    ) -> Box<dyn CallHandle> {
        self.log.lock().push(format!("construct {}", self.label));
        let inner = next.create_call(descriptor);
        Box::new(InterceptingCall::new(
            inner,
            Some(Box::new(LabelRequester {
                label: self.label,
                log: Arc::clone(&self.log),
            })),
            Some(Box::new(LabelListener {
                label: self.label,
                log: Arc::clone(&self.log),
            })),
        ))
    }
}

struct LabelRequester {
    label: &'static str,
    log: EventLog,
}

impl Requester for LabelRequester {
    fn start(
        &mut self,
        metadata: Metadata,
        listener: Box<dyn CallListener>,
        next: &mut dyn CallHandle,
    ) -> crate::Result<()> {
        self.log.lock().push(format!("start {}", self.label));
        next.start(metadata, listener)
    }

    fn send_message(
        &mut self,
        payload: Vec<u8>,
        flags: WriteFlags,
        next: &mut dyn CallHandle,
    ) -> crate::Result<()> {
        self.log.lock().push(format!("send {}", self.label));
        next.send_message(payload, flags)
    }

    fn half_close(&mut self, next: &mut dyn CallHandle) -> crate::Result<()> {
        self.log.lock().push(format!("half_close {}", self.label));
        next.half_close()
    }

    fn cancel(&mut self, reason: &str, next: &mut dyn CallHandle) {
        self.log.lock().push(format!("cancel {}", self.label));
        next.cancel(reason)
    }
}

struct LabelListener {
    label: &'static str,
    log: EventLog,
}

impl ListenerOverride for LabelListener {
    fn on_metadata(&mut self, metadata: Metadata, next: &mut dyn CallListener) {
        self.log.lock().push(format!("receive {}", self.label));
        next.on_metadata(metadata)
    }

    fn on_message(&mut self, payload: Vec<u8>, next: &mut dyn CallListener) {
        self.log.lock().push(format!("message {}", self.label));
        next.on_message(payload)
    }

    fn on_status(&mut self, status: Status, next: &mut dyn CallListener) {
        self.log.lock().push(format!("status {}", self.label));
        next.on_status(status)
    }
}
