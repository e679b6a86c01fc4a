//! 调用句柄契约：传输层对单次 RPC 暴露的最小能力面。
//!
//! # 设计背景（Why）
//! - 拦截管线消费而不实现传输：链路最底端是传输层提供的终端工厂，
//!   每次触发产出一个独占的调用句柄；
//! - 三个 Trait 全部保持对象安全，以便以 `Box<dyn _>` / `Arc<dyn _>` 形式
//!   在任意层数的拦截器之间流动。

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::descriptor::{CallDescriptor, WriteFlags};
use crate::metadata::Metadata;
use crate::status::Status;

/// 单次 RPC 的出站能力面。
///
/// # 逻辑解析（How）
/// - 生命周期沿 `created → started → half-closed → finished` 推进，
///   合法操作序列由调用形状决定（见状态机模块的判定表）；
/// - `start` 注册入站监听器并发送初始元数据；之后的出站操作全部经由同一句柄。
///
/// # 契约说明（What）
/// - **所有权**：句柄由包装它的拦截调用独占持有，绝不在两个拦截调用之间共享；
///   需要发起第二条独立 RPC 的拦截器必须向链路工厂索取全新句柄；
/// - **错误通道**：远端/传输失败只通过监听器的终态交付，`start`/`send_message`/
///   `half_close` 的 `Err` 仅表示程序性误用（状态违例、重复 start 等）；
/// - **终态保证**：每个被 `start` 过的句柄最终恰好触发一次 `on_status`，
///   包括在发出任何字节之前就被取消的句柄（此时终态为 `CANCELLED`）。
pub trait CallHandle: Send {
    /// 发起调用：发送初始元数据并注册入站监听器。
    ///
    /// 对同一句柄重复调用返回
    /// [`codes::CALL_ALREADY_STARTED`](crate::error::codes::CALL_ALREADY_STARTED)。
    fn start(&mut self, metadata: Metadata, listener: Box<dyn CallListener>) -> crate::Result<()>;

    /// 发送一条出站消息。
    ///
    /// 仅在已启动且未半关/未终结时合法，否则返回
    /// [`codes::CALL_STATE_VIOLATION`](crate::error::codes::CALL_STATE_VIOLATION)。
    fn send_message(&mut self, payload: Vec<u8>, flags: WriteFlags) -> crate::Result<()>;

    /// 半关：声明不再发送出站消息。仅合法一次。
    fn half_close(&mut self) -> crate::Result<()>;

    /// 请求取消。终结前任意状态下合法且幂等；尽力而为，远端可能已观察到部分进展。
    fn cancel(&mut self, reason: &str);
}

/// 单次 RPC 的入站事件监听器。
///
/// # 契约说明（What）
/// - 同一调用的事件按 元数据 → 消息（按发送顺序）→ 终态 的顺序恰好各交付一次
///   （消息条数由调用形状决定）；
/// - 交付由管线串行化，单个调用的回调之间绝不交错；
/// - 交付给监听器的 [`Metadata`] 已冻结，视为只读。
pub trait CallListener: Send {
    /// 收到初始元数据。
    fn on_metadata(&mut self, metadata: Metadata);

    /// 收到一条入站消息。
    fn on_message(&mut self, payload: Vec<u8>);

    /// 收到终态。每个调用恰好一次，此后不再有任何事件。
    fn on_status(&mut self, status: Status);
}

/// 调用工厂：按描述符产出新的调用句柄。
///
/// # 契约说明（What）
/// - 传输层提供终端实现；拦截器链装配产出的外层工厂同样实现本 Trait，
///   因此拦截器无需区分“下一层是传输还是另一个拦截器”；
/// - 每次 `create_call` 必须返回全新的独占句柄，工厂自身可被并发共享。
pub trait CallFactory: Send + Sync {
    /// 为一次调用构造新句柄。构造是同步且无副作用的，真正的网络活动始于 `start`。
    fn create_call(&self, descriptor: &CallDescriptor) -> Box<dyn CallHandle>;
}
