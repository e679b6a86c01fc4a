//! 调用拦截管线：句柄契约、洋葱组合、链装配、状态机与交付闸门。
//!
//! # 模块导读
//! - [`handle`]：传输层对单次 RPC 暴露的最小能力面（句柄/监听器/工厂）；
//! - [`intercepting`]：部分覆盖记录与拦截调用组合器；
//! - [`chain`]：把有序拦截器列表折叠为单个调用工厂；
//! - [`state`]：按调用形状裁决合法操作序列；
//! - [`gate`]：入站事件串行化、终态去重与取消竞争裁决；
//! - [`flow`]：应用侧等待原语（单值槽与消息队列）。

pub mod chain;
pub mod flow;
pub mod gate;
pub mod handle;
pub mod intercepting;
pub mod state;

pub use chain::{
    CallInterceptor, InterceptorDescriptor, InterceptorProvider, assemble, resolve_providers,
    validate_configuration,
};
pub use flow::{MessageQueue, MessageStream, NextMessage, ReplyFuture, ReplySlot};
pub use gate::DeliveryGate;
pub use handle::{CallFactory, CallHandle, CallListener};
pub use intercepting::{
    InterceptingCall, InterceptingListener, ListenerOverride, PassthroughListener,
    PassthroughRequester, Requester,
};
pub use state::{CallPhase, CallSignal, CallStateMachine};
