//! 调用入口：面向存根的四形状调用表面。
//!
//! # 设计背景（Why）
//! - 存根只与最外层调用对象交互：单次调用得到响应 Future，流式调用得到
//!   写入方法与消息流，所有形状都有终态/元数据观察点与 `cancel`；
//! - 拦截器配置冲突在此处快速失败——在构造任何调用对象、产生任何网络活动
//!   之前即返回错误；
//! - 出站操作先经调用表面内嵌的状态机同步校验，再进入拦截器链，
//!   非法序列绝不触达传输层。

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::descriptor::{
    CallDescriptor, CallOptions, CallShape, Marshaller, MethodDescriptor, WriteFlags,
};
use crate::error::{CallError, codes};
use crate::metadata::Metadata;
use crate::observability::{CallEvent, CallEventKind, NoopEventSink, SharedEventSink};
use crate::pipeline::chain::{self, CallInterceptor};
use crate::pipeline::flow::{MessageQueue, MessageStream, NextMessage, ReplyFuture, ReplySlot};
use crate::pipeline::gate::DeliveryGate;
use crate::pipeline::handle::{CallFactory, CallHandle, CallListener};
use crate::pipeline::state::{CallSignal, CallStateMachine};
use crate::status::{Status, StatusCode};

type SharedHandle = Arc<Mutex<Box<dyn CallHandle>>>;

/// 调用入口：持有传输终端工厂与事件接收器，按需装配拦截器链并发起调用。
///
/// # 逻辑解析（How）
/// - 每次调用：校验配置 → 求值提供者 → 折叠拦截器链 → 构造最外层句柄 →
///   以交付闸门包住应用侧监听器 → `start`（单次/服务端流还会立即发送请求
///   并半关）；
/// - `CallInvoker` 自身无状态可变性，可被并发共享。
pub struct CallInvoker {
    transport: Arc<dyn CallFactory>,
    sink: SharedEventSink,
}

impl CallInvoker {
    /// 创建入口构建器。
    pub fn builder(transport: Arc<dyn CallFactory>) -> CallInvokerBuilder {
        CallInvokerBuilder {
            transport,
            sink: Arc::new(NoopEventSink),
        }
    }

    /// 发起单次调用（类型化边界）。
    ///
    /// 请求在入口处经 [`Marshaller`] 编码；响应字节通过
    /// [`UnaryReply::decode`] 还原。
    pub fn unary<Req, Resp>(
        &self,
        method: MethodDescriptor,
        marshaller: &Marshaller<Req, Resp>,
        request: &Req,
        options: CallOptions,
    ) -> crate::Result<UnaryCall> {
        let payload = marshaller.serialize(request)?;
        self.unary_payload(method, payload, options)
    }

    /// 发起单次调用（字节载荷）。
    ///
    /// # 契约说明（What）
    /// - 入口同步完成 `start` → 发送请求 → 半关，返回的 [`UnaryCall`]
    ///   仅剩等待与取消两种能力；
    /// - **错误**：配置冲突返回 [`codes::CALL_INTERCEPTOR_CONFLICT`]；
    ///   形状不符返回 [`codes::CALL_STATE_VIOLATION`]。
    pub fn unary_payload(
        &self,
        method: MethodDescriptor,
        payload: Vec<u8>,
        options: CallOptions,
    ) -> crate::Result<UnaryCall> {
        ensure_shape(&method, CallShape::Unary)?;
        let flags = options.write_flags;
        let (slot, future) = ReplySlot::new();
        let listener = UnaryListener {
            slot,
            headers: None,
            payload: None,
        };
        let mut surface = self.launch(method, options, Box::new(listener))?;
        surface.send(payload, flags)?;
        surface.half_close()?;
        Ok(UnaryCall {
            surface,
            response: future,
        })
    }

    /// 发起客户端流调用：返回可多次写入、半关后等待单响应的表面。
    pub fn client_streaming(
        &self,
        method: MethodDescriptor,
        options: CallOptions,
    ) -> crate::Result<ClientStreamingCall> {
        ensure_shape(&method, CallShape::ClientStreaming)?;
        let (slot, future) = ReplySlot::new();
        let listener = UnaryListener {
            slot,
            headers: None,
            payload: None,
        };
        let surface = self.launch(method, options, Box::new(listener))?;
        Ok(ClientStreamingCall {
            surface,
            response: future,
        })
    }

    /// 发起服务端流调用：入口发送唯一请求并半关，返回消息流与终态观察点。
    pub fn server_streaming(
        &self,
        method: MethodDescriptor,
        payload: Vec<u8>,
        options: CallOptions,
    ) -> crate::Result<ServerStreamingCall> {
        ensure_shape(&method, CallShape::ServerStreaming)?;
        let flags = options.write_flags;
        let (listener, parts) = StreamingListener::new();
        let mut surface = self.launch(method, options, Box::new(listener))?;
        surface.send(payload, flags)?;
        surface.half_close()?;
        Ok(ServerStreamingCall { surface, parts })
    }

    /// 发起双向流调用：两侧均为 0..N 条消息。
    pub fn bidi_streaming(
        &self,
        method: MethodDescriptor,
        options: CallOptions,
    ) -> crate::Result<BidiStreamingCall> {
        ensure_shape(&method, CallShape::BidiStreaming)?;
        let (listener, parts) = StreamingListener::new();
        let surface = self.launch(method, options, Box::new(listener))?;
        Ok(BidiStreamingCall { surface, parts })
    }

    /// 公共发起路径：配置校验、链装配、闸门包装与 `start`。
    fn launch(
        &self,
        method: MethodDescriptor,
        options: CallOptions,
        listener: Box<dyn CallListener>,
    ) -> crate::Result<CallSurface> {
        chain::validate_configuration(&options.interceptors, &options.interceptor_providers)?;
        let effective: Vec<Arc<dyn CallInterceptor>> = if options.interceptors.is_empty() {
            chain::resolve_providers(&options.interceptor_providers, &method)
        } else {
            options.interceptors.clone()
        };

        let shape = method.shape();
        let source: Cow<'static, str> = Cow::Owned(method.full_name().into());
        // 描述符令牌经 child() 派生：与调用方令牌共享同一原子位。
        let mut builder = CallDescriptor::builder(method)
            .with_deadline(options.deadline)
            .with_cancellation(options.cancellation.child())
            .with_wait_for_ready(options.wait_for_ready);
        if let Some(host) = options.host_override.clone() {
            builder = builder.with_host_override(host);
        }
        let descriptor = builder.build();

        let factory = chain::assemble(&effective, Arc::clone(&self.transport));
        self.sink.record(
            CallEvent::new(CallEventKind::ChainAssembled, source.clone())
                .with_note(Cow::Owned(format!("{} interceptor(s)", effective.len()))),
        );

        let gate = DeliveryGate::new(listener, Arc::clone(&self.sink), source.clone());
        let mut handle = factory.create_call(&descriptor);
        let mut machine = CallStateMachine::new(shape);
        machine.apply(CallSignal::Start)?;
        handle.start(options.metadata.clone(), gate.listener())?;
        self.sink
            .record(CallEvent::new(CallEventKind::CallStarted, source));

        Ok(CallSurface {
            handle: Arc::new(Mutex::new(handle)),
            gate,
            machine,
            descriptor,
        })
    }
}

/// `CallInvoker` 构建器。
pub struct CallInvokerBuilder {
    transport: Arc<dyn CallFactory>,
    sink: SharedEventSink,
}

impl CallInvokerBuilder {
    /// 注入事件接收器。
    pub fn with_event_sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = sink;
        self
    }

    /// 构建调用入口。
    pub fn build(self) -> CallInvoker {
        CallInvoker {
            transport: self.transport,
            sink: self.sink,
        }
    }
}

fn ensure_shape(method: &MethodDescriptor, expected: CallShape) -> crate::Result<()> {
    if method.shape() != expected {
        return Err(CallError::new(
            codes::CALL_STATE_VIOLATION,
            "方法形状与调用入口不匹配",
        ));
    }
    Ok(())
}

/// 四种表面共享的内核：句柄、闸门与出站状态机。
struct CallSurface {
    handle: SharedHandle,
    gate: DeliveryGate,
    machine: CallStateMachine,
    descriptor: CallDescriptor,
}

impl CallSurface {
    fn send(&mut self, payload: Vec<u8>, flags: WriteFlags) -> crate::Result<()> {
        self.machine.apply(CallSignal::SendMessage)?;
        self.handle.lock().send_message(payload, flags)
    }

    fn half_close(&mut self) -> crate::Result<()> {
        self.machine.apply(CallSignal::HalfClose)?;
        self.handle.lock().half_close()
    }

    fn cancel(&self, reason: &str) {
        if self.descriptor.cancellation().cancel() {
            self.handle.lock().cancel(reason);
        }
        // 传输层未及时交付终态时由闸门合成 CANCELLED；重复取消在闸门内去重。
        self.gate.cancel(reason);
    }

    fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            handle: Arc::clone(&self.handle),
            gate: self.gate.clone(),
            cancellation: self.descriptor.cancellation().child(),
        }
    }
}

/// 可独立克隆传递的取消柄。
///
/// # 契约说明（What）
/// - `cancel` 幂等：首次触发向传输层传播并保证一个 `CANCELLED` 终态
///   （若真实终态尚未到达）；后续调用为空操作。
#[derive(Clone)]
pub struct CancelHandle {
    handle: SharedHandle,
    gate: DeliveryGate,
    cancellation: crate::contract::Cancellation,
}

impl CancelHandle {
    /// 请求取消。
    pub fn cancel(&self, reason: &str) {
        if self.cancellation.cancel() {
            self.handle.lock().cancel(reason);
        }
        self.gate.cancel(reason);
    }

    /// 查询是否已请求过取消。
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// 单次/客户端流调用的成功结果：响应头、响应载荷与尾部元数据。
#[derive(Clone, Debug, PartialEq)]
pub struct UnaryReply {
    /// 响应头（若远端未显式发送则为空）。
    pub headers: Metadata,
    /// 响应载荷。
    pub payload: Vec<u8>,
    /// 终态尾部元数据。
    pub trailers: Metadata,
}

impl UnaryReply {
    /// 以类型化编解码对还原响应。
    pub fn decode<Req, Resp>(&self, marshaller: &Marshaller<Req, Resp>) -> crate::Result<Resp> {
        marshaller.deserialize(&self.payload)
    }
}

/// 单响应监听器：聚合 头/载荷/终态 并一次性写入响应槽。
struct UnaryListener {
    slot: ReplySlot<Result<UnaryReply, Status>>,
    headers: Option<Metadata>,
    payload: Option<Vec<u8>>,
}

impl CallListener for UnaryListener {
    fn on_metadata(&mut self, metadata: Metadata) {
        self.headers = Some(metadata);
    }

    fn on_message(&mut self, payload: Vec<u8>) {
        if self.payload.is_none() {
            self.payload = Some(payload);
        }
    }

    fn on_status(&mut self, status: Status) {
        let outcome = if status.is_ok() {
            match self.payload.take() {
                Some(payload) => Ok(UnaryReply {
                    headers: self.headers.take().unwrap_or_default(),
                    payload,
                    trailers: status.into_trailers(),
                }),
                // OK 终态却没有响应载荷：属远端契约破坏，折算为失败终态。
                None => Err(Status::new(StatusCode::Internal, "成功终态缺少响应载荷")),
            }
        } else {
            Err(status)
        };
        self.slot.fill(outcome);
    }
}

/// 单次调用表面：等待响应或取消。
pub struct UnaryCall {
    surface: CallSurface,
    response: ReplyFuture<Result<UnaryReply, Status>>,
}

impl UnaryCall {
    /// 请求取消。
    pub fn cancel(&self, reason: &str) {
        self.surface.cancel(reason)
    }

    /// 派生可独立传递的取消柄。
    pub fn cancel_handle(&self) -> CancelHandle {
        self.surface.cancel_handle()
    }

    /// 等待终局：成功得到 [`UnaryReply`]，失败得到非 OK 的 [`Status`]。
    pub fn response(&mut self) -> &mut ReplyFuture<Result<UnaryReply, Status>> {
        &mut self.response
    }
}

/// 客户端流调用表面：多次写入、半关后等待单响应。
pub struct ClientStreamingCall {
    surface: CallSurface,
    response: ReplyFuture<Result<UnaryReply, Status>>,
}

impl ClientStreamingCall {
    /// 发送一条请求消息。半关之后调用返回
    /// [`codes::CALL_STATE_VIOLATION`]，且不会触达传输层。
    pub fn send(&mut self, payload: Vec<u8>, flags: WriteFlags) -> crate::Result<()> {
        self.surface.send(payload, flags)
    }

    /// 半关：声明请求流结束。仅合法一次。
    pub fn half_close(&mut self) -> crate::Result<()> {
        self.surface.half_close()
    }

    /// 请求取消。
    pub fn cancel(&self, reason: &str) {
        self.surface.cancel(reason)
    }

    /// 派生取消柄。
    pub fn cancel_handle(&self) -> CancelHandle {
        self.surface.cancel_handle()
    }

    /// 等待终局。
    pub fn response(&mut self) -> &mut ReplyFuture<Result<UnaryReply, Status>> {
        &mut self.response
    }
}

/// 流式表面的入站端：响应头快照、消息流与终态槽。
struct StreamingParts {
    headers: Arc<Mutex<Option<Metadata>>>,
    messages: MessageStream<Vec<u8>>,
    status: ReplyFuture<Status>,
}

struct StreamingListener {
    headers: Arc<Mutex<Option<Metadata>>>,
    queue: MessageQueue<Vec<u8>>,
    status: ReplySlot<Status>,
}

impl StreamingListener {
    fn new() -> (Self, StreamingParts) {
        let headers = Arc::new(Mutex::new(None));
        let (queue, messages) = MessageQueue::new();
        let (status_slot, status_future) = ReplySlot::new();
        (
            Self {
                headers: Arc::clone(&headers),
                queue,
                status: status_slot,
            },
            StreamingParts {
                headers,
                messages,
                status: status_future,
            },
        )
    }
}

impl CallListener for StreamingListener {
    fn on_metadata(&mut self, metadata: Metadata) {
        *self.headers.lock() = Some(metadata);
    }

    fn on_message(&mut self, payload: Vec<u8>) {
        self.queue.push(payload);
    }

    fn on_status(&mut self, status: Status) {
        self.queue.close();
        self.status.fill(status);
    }
}

/// 服务端流调用表面：拉取响应消息并观察终态。
pub struct ServerStreamingCall {
    surface: CallSurface,
    parts: StreamingParts,
}

impl ServerStreamingCall {
    /// 非阻塞读取响应头快照（尚未到达时为 `None`）。
    pub fn headers(&self) -> Option<Metadata> {
        self.parts.headers.lock().clone()
    }

    /// 等待下一条响应消息；流结束返回 `None`。
    pub fn next_message(&mut self) -> NextMessage<'_, Vec<u8>> {
        self.parts.messages.next()
    }

    /// 等待终态。
    pub fn status(&mut self) -> &mut ReplyFuture<Status> {
        &mut self.parts.status
    }

    /// 请求取消。
    pub fn cancel(&self, reason: &str) {
        self.surface.cancel(reason)
    }

    /// 派生取消柄。
    pub fn cancel_handle(&self) -> CancelHandle {
        self.surface.cancel_handle()
    }
}

/// 双向流调用表面：两侧消息流均为 0..N。
pub struct BidiStreamingCall {
    surface: CallSurface,
    parts: StreamingParts,
}

impl BidiStreamingCall {
    /// 发送一条请求消息。
    pub fn send(&mut self, payload: Vec<u8>, flags: WriteFlags) -> crate::Result<()> {
        self.surface.send(payload, flags)
    }

    /// 半关：声明请求流结束。
    pub fn half_close(&mut self) -> crate::Result<()> {
        self.surface.half_close()
    }

    /// 非阻塞读取响应头快照。
    pub fn headers(&self) -> Option<Metadata> {
        self.parts.headers.lock().clone()
    }

    /// 等待下一条响应消息；流结束返回 `None`。
    pub fn next_message(&mut self) -> NextMessage<'_, Vec<u8>> {
        self.parts.messages.next()
    }

    /// 等待终态。
    pub fn status(&mut self) -> &mut ReplyFuture<Status> {
        &mut self.parts.status
    }

    /// 请求取消。
    pub fn cancel(&self, reason: &str) {
        self.surface.cancel(reason)
    }

    /// 派生取消柄。
    pub fn cancel_handle(&self) -> CancelHandle {
        self.surface.cancel_handle()
    }
}
