//! 回退拦截器：以合成响应掩盖流式调用的失败终态。

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::descriptor::CallDescriptor;
use crate::metadata::Metadata;
use crate::observability::{CallEvent, CallEventKind, NoopEventSink, SharedEventSink};
use crate::pipeline::chain::{CallInterceptor, InterceptorDescriptor};
use crate::pipeline::handle::{CallFactory, CallHandle, CallListener};
use crate::pipeline::intercepting::{InterceptingCall, ListenerOverride};
use crate::status::Status;

/// 在非 OK 终态到达时，用一条合成的最终消息与 `OK` 终态替换失败结果。
///
/// # 契约说明（What）
/// - 仅改写入站侧：出站操作原样透传；
/// - 若失败前远端尚未发送过响应头，回退时先补发一份空元数据，
///   保证上层观察到完整的 元数据 → 消息 → 终态 序列；
/// - 内层已成功交付的消息不受影响，合成消息追加在它们之后。
pub struct FallbackInterceptor {
    payload: Vec<u8>,
    sink: SharedEventSink,
}

impl FallbackInterceptor {
    /// 以回退载荷构造。
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            sink: Arc::new(NoopEventSink),
        }
    }

    /// 注入事件接收器。
    pub fn with_event_sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = sink;
        self
    }
}

impl CallInterceptor for FallbackInterceptor {
    fn descriptor(&self) -> InterceptorDescriptor {
        InterceptorDescriptor::new("fallback", "resilience", "以合成响应掩盖失败终态")
    }

    fn intercept(
        &self,
        descriptor: &CallDescriptor,
        next: Arc<dyn CallFactory>,
    ) -> Box<dyn CallHandle> {
        let inner = next.create_call(descriptor);
        Box::new(InterceptingCall::with_listener(
            inner,
            Box::new(FallbackListener {
                payload: self.payload.clone(),
                sink: Arc::clone(&self.sink),
                source: descriptor.method().full_name().to_owned(),
                saw_metadata: false,
            }),
        ))
    }
}

struct FallbackListener {
    payload: Vec<u8>,
    sink: SharedEventSink,
    source: alloc::string::String,
    saw_metadata: bool,
}

impl ListenerOverride for FallbackListener {
    fn on_metadata(&mut self, metadata: Metadata, next: &mut dyn CallListener) {
        self.saw_metadata = true;
        next.on_metadata(metadata);
    }

    fn on_status(&mut self, status: Status, next: &mut dyn CallListener) {
        if status.is_ok() {
            next.on_status(status);
            return;
        }
        self.sink.record(
            CallEvent::new(CallEventKind::FallbackEngaged, self.source.clone())
                .with_note(alloc::format!("masked {}", status.code())),
        );
        if !self.saw_metadata {
            self.saw_metadata = true;
            next.on_metadata(Metadata::new());
        }
        next.on_message(self.payload.clone());
        next.on_status(Status::ok());
    }
}
