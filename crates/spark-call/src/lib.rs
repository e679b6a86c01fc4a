#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![allow(private_bounds)]
#![doc = "spark-call: 协议无关的调用拦截管线与流式调用生命周期核心契约。"]
#![doc = ""]
#![doc = "位于生成存根与底层传输之间：零或多个拦截器可以观察、改写、短路、重试"]
#![doc = "或扇出一次远程调用，而存根与传输对拦截器的存在毫无感知。四种调用形状"]
#![doc = "（单次 / 客户端流 / 服务端流 / 双向流）共用同一套句柄契约与洋葱顺序不变量："]
#![doc = "构造与出站自外向内，入站自内向外。"]

extern crate alloc;

mod sealed;

pub mod contract;
pub mod descriptor;
pub mod error;
pub mod future;
pub mod interceptor;
pub mod invoke;
pub mod metadata;
pub mod observability;
pub mod pipeline;
pub mod status;
pub mod test_stubs;

pub use contract::{Cancellation, ContractStateMachine, Deadline, MonotonicTimePoint, StateAdvance};
pub use descriptor::{
    CallDescriptor, CallDescriptorBuilder, CallOptions, CallShape, Marshaller, MethodDescriptor,
    WriteFlags,
};
pub use error::{CallError, ErrorCause, Result};
pub use future::Stream;
pub use invoke::{
    BidiStreamingCall, CallInvoker, CallInvokerBuilder, CancelHandle, ClientStreamingCall,
    ServerStreamingCall, UnaryCall, UnaryReply,
};
pub use metadata::{BINARY_SUFFIX, Metadata, MetadataValue};
pub use observability::{CallEvent, CallEventKind, EventSink, NoopEventSink, SharedEventSink};
pub use pipeline::{
    CallFactory, CallHandle, CallInterceptor, CallListener, CallPhase, CallSignal,
    CallStateMachine, DeliveryGate, InterceptingCall, InterceptingListener, InterceptorDescriptor,
    InterceptorProvider, ListenerOverride, Requester,
};
pub use status::{Status, StatusCode};

use core::fmt;

/// `spark-call` 中所有错误必须实现的 `no_std` 基础 Trait。
///
/// # 设计背景（Why）
/// - `std::error::Error` 在 `no_std` 环境中不可用，因此需要一个对象安全、
///   与平台无关的错误抽象来串联底层错误链。
///
/// # 逻辑解析（How）
/// - 约束实现者提供 `Debug` 与 `Display`，便于日志与可观测性收集；
/// - `source` 递归返回链路上的上游错误，与 `std::error::Error::source` 语义一致。
///
/// # 设计取舍与风险（Trade-offs）
/// - 未引入 `Send + Sync` 约束，避免对 `no_std` 设备强加多余负担；
///   需要线程安全时使用 [`ErrorCause`] 类型别名。
pub trait Error: fmt::Debug + fmt::Display + crate::sealed::Sealed {
    /// 返回当前错误的上游来源。
    fn source(&self) -> Option<&(dyn Error + 'static)>;
}

impl<E> Error for alloc::boxed::Box<E>
where
    E: Error + ?Sized,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        (**self).source()
    }
}
