//! 拦截调用：部分覆盖记录与透传默认值的组合器。
//!
//! # 设计背景（Why）
//! - 拦截器通常只关心生命周期钩子的一小部分；以“部分覆盖记录”表达覆盖集，
//!   未覆盖的钩子落入 Trait 默认方法的透传实现，而不是在每个调用点判空；
//! - [`InterceptingCall`] 将一个覆盖对叠加在任意内层句柄之上，层层嵌套即构成
//!   洋葱结构：出站操作自外向内传播，入站事件自内向外传播。

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::descriptor::WriteFlags;
use crate::metadata::Metadata;
use crate::pipeline::handle::{CallHandle, CallListener};
use crate::status::Status;

/// 出站钩子集合，默认全部透传到下一层。
///
/// # 契约说明（What）
/// - 每个钩子收到 `next`（下一层句柄），必须继续驱动它（可转换参数），
///   或者转而驱动另一条内层调用并最终向外层交付语义等价的完成信号；
///   两者都不做将导致外层等待方永久阻塞；
/// - 钩子在调用线程上同步执行，不得假设自有调度器。
pub trait Requester: Send {
    /// 拦截 `start`。
    fn start(
        &mut self,
        metadata: Metadata,
        listener: Box<dyn CallListener>,
        next: &mut dyn CallHandle,
    ) -> crate::Result<()> {
        next.start(metadata, listener)
    }

    /// 拦截 `send_message`。
    fn send_message(
        &mut self,
        payload: Vec<u8>,
        flags: WriteFlags,
        next: &mut dyn CallHandle,
    ) -> crate::Result<()> {
        next.send_message(payload, flags)
    }

    /// 拦截 `half_close`。
    fn half_close(&mut self, next: &mut dyn CallHandle) -> crate::Result<()> {
        next.half_close()
    }

    /// 拦截 `cancel`。
    fn cancel(&mut self, reason: &str, next: &mut dyn CallHandle) {
        next.cancel(reason)
    }
}

/// 入站钩子集合，默认全部透传到下一层监听器。
///
/// # 契约说明（What）
/// - 每个钩子对每个入站事件必须恰好调用一次 `next`（可转换事件内容），
///   或者有意合成替代事件流（回退模式）；
/// - 重复向外层交付终态会被交付闸门丢弃并上报事件，而非静默通过。
pub trait ListenerOverride: Send {
    /// 拦截入站元数据。
    fn on_metadata(&mut self, metadata: Metadata, next: &mut dyn CallListener) {
        next.on_metadata(metadata)
    }

    /// 拦截入站消息。
    fn on_message(&mut self, payload: Vec<u8>, next: &mut dyn CallListener) {
        next.on_message(payload)
    }

    /// 拦截终态。
    fn on_status(&mut self, status: Status, next: &mut dyn CallListener) {
        next.on_status(status)
    }
}

/// 全透传的出站覆盖，供只关心入站侧的拦截器使用。
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughRequester;

impl Requester for PassthroughRequester {}

/// 全透传的入站覆盖，供只关心出站侧的拦截器使用。
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughListener;

impl ListenerOverride for PassthroughListener {}

/// 拦截调用：在内层句柄之上叠加至多一对出站/入站覆盖。
///
/// # 逻辑解析（How）
/// - 出站操作先经过本层 [`Requester`] 钩子，再进入内层句柄；
/// - `start` 时将下游监听器包进 [`InterceptingListener`]，使入站事件先经过
///   本层 [`ListenerOverride`] 钩子再继续向外传播；
/// - 入站覆盖在 `start` 时被取走并移交给监听器包装，因此重复 `start`
///   在抵达内层之前就会被内层句柄以重复启动错误拒绝。
pub struct InterceptingCall {
    inner: Box<dyn CallHandle>,
    requester: Option<Box<dyn Requester>>,
    listener_hooks: Option<Box<dyn ListenerOverride>>,
}

impl InterceptingCall {
    /// 以内层句柄与覆盖对构造拦截调用。
    pub fn new(
        inner: Box<dyn CallHandle>,
        requester: Option<Box<dyn Requester>>,
        listener_hooks: Option<Box<dyn ListenerOverride>>,
    ) -> Self {
        Self {
            inner,
            requester,
            listener_hooks,
        }
    }

    /// 只覆盖出站侧。
    pub fn with_requester(inner: Box<dyn CallHandle>, requester: Box<dyn Requester>) -> Self {
        Self::new(inner, Some(requester), None)
    }

    /// 只覆盖入站侧。
    pub fn with_listener(inner: Box<dyn CallHandle>, hooks: Box<dyn ListenerOverride>) -> Self {
        Self::new(inner, None, Some(hooks))
    }
}

impl CallHandle for InterceptingCall {
    fn start(&mut self, metadata: Metadata, listener: Box<dyn CallListener>) -> crate::Result<()> {
        let listener: Box<dyn CallListener> = match self.listener_hooks.take() {
            Some(hooks) => Box::new(InterceptingListener {
                hooks,
                next: listener,
            }),
            None => listener,
        };
        match self.requester.as_mut() {
            Some(requester) => requester.start(metadata, listener, self.inner.as_mut()),
            None => self.inner.start(metadata, listener),
        }
    }

    fn send_message(&mut self, payload: Vec<u8>, flags: WriteFlags) -> crate::Result<()> {
        match self.requester.as_mut() {
            Some(requester) => requester.send_message(payload, flags, self.inner.as_mut()),
            None => self.inner.send_message(payload, flags),
        }
    }

    fn half_close(&mut self) -> crate::Result<()> {
        match self.requester.as_mut() {
            Some(requester) => requester.half_close(self.inner.as_mut()),
            None => self.inner.half_close(),
        }
    }

    fn cancel(&mut self, reason: &str) {
        match self.requester.as_mut() {
            Some(requester) => requester.cancel(reason, self.inner.as_mut()),
            None => self.inner.cancel(reason),
        }
    }
}

/// 将入站覆盖叠加在下游监听器之上的包装。
pub struct InterceptingListener {
    hooks: Box<dyn ListenerOverride>,
    next: Box<dyn CallListener>,
}

impl InterceptingListener {
    /// 构造监听器包装。
    pub fn new(hooks: Box<dyn ListenerOverride>, next: Box<dyn CallListener>) -> Self {
        Self { hooks, next }
    }
}

impl CallListener for InterceptingListener {
    fn on_metadata(&mut self, metadata: Metadata) {
        self.hooks.on_metadata(metadata, self.next.as_mut())
    }

    fn on_message(&mut self, payload: Vec<u8>) {
        self.hooks.on_message(payload, self.next.as_mut())
    }

    fn on_status(&mut self, status: Status) {
        self.hooks.on_status(status, self.next.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{CallDescriptor, CallShape, MethodDescriptor, WriteFlags};
    use crate::pipeline::handle::CallFactory;
    use crate::test_stubs::{MockTransport, RecordingListener, event_log};
    use alloc::sync::Arc;
    use alloc::vec;

    /// 双侧全透传的覆盖对不改变事件流：外层监听器看到的序列与裸句柄一致。
    #[test]
    fn passthrough_overrides_preserve_event_flow() {
        let transport = MockTransport::new();
        let descriptor =
            CallDescriptor::builder(MethodDescriptor::new("demo.Echo/Echo", CallShape::Unary))
                .build();
        let mut call = InterceptingCall::new(
            transport.create_call(&descriptor),
            Some(Box::new(PassthroughRequester)),
            Some(Box::new(PassthroughListener)),
        );

        let log = event_log();
        call.start(
            Metadata::new(),
            Box::new(RecordingListener::new("x", Arc::clone(&log))),
        )
        .unwrap();
        call.send_message(vec![1, 2], WriteFlags::default()).unwrap();
        call.half_close().unwrap();

        assert_eq!(
            log.lock().as_slice(),
            ["metadata x", "message x", "status x OK"]
        );
        assert_eq!(transport.started_calls(), 1);
    }
}
