use core::{
    pin::Pin,
    task::{Context, Poll},
};

use crate::sealed::Sealed;

/// `Stream` 描述按需拉取元素的异步序列。
///
/// # 设计背景（Why）
/// - 流式调用（服务端流、双向流）的响应侧以拉取模型暴露给调用方；
///   接口与 `futures_core::Stream` 保持一致，确保生态互操作。
///
/// # 契约说明（What）
/// - `poll_next` 与标准 Stream 语义一致，返回 `Poll<Option<Item>>`；
/// - 返回 `None` 后不应再次轮询。
pub trait Stream: Sealed {
    /// 流中产生的元素类型。
    type Item;

    /// 从流中轮询下一个元素。
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>>;
}
