//! 调用表面的等待原语：单值槽与入站消息队列。
//!
//! # 设计背景（Why）
//! - 单次调用的“等待响应”、流式调用的“拉取下一条消息”是应用侧仅有的
//!   合法等待点，必须以 Future/Stream 形式表达，保证同进程内多条并发调用
//!   互不阻塞；
//! - 核心不绑定执行器：原语只依赖 `core::task` 的标准唤醒协议，
//!   既能跑在工作线程池，也能跑在单线程事件循环。

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use spin::Mutex;

use crate::future::Stream;

struct SlotInner<T> {
    value: Option<T>,
    taken: bool,
    waker: Option<Waker>,
}

/// 单值槽的写入端。首次写入胜出，后续写入被丢弃。
///
/// # 契约说明（What）
/// - `fill` 返回 `true` 表示本次写入生效；`false` 表示槽已被占用；
/// - 写入后唤醒等待中的 [`ReplyFuture`]；
/// - 写入端可克隆共享（闸门与取消路径各持一份）。
pub struct ReplySlot<T> {
    inner: Arc<Mutex<SlotInner<T>>>,
}

impl<T> Clone for ReplySlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ReplySlot<T> {
    /// 创建写入端与等待端配对。
    pub fn new() -> (Self, ReplyFuture<T>) {
        let inner = Arc::new(Mutex::new(SlotInner {
            value: None,
            taken: false,
            waker: None,
        }));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            ReplyFuture { inner },
        )
    }

    /// 写入值。首次写入返回 `true` 并唤醒等待方。
    pub fn fill(&self, value: T) -> bool {
        let waker = {
            let mut inner = self.inner.lock();
            if inner.value.is_some() || inner.taken {
                return false;
            }
            inner.value = Some(value);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// 查询槽是否已被写入或取走。
    pub fn is_filled(&self) -> bool {
        let inner = self.inner.lock();
        inner.value.is_some() || inner.taken
    }
}

/// 单值槽的等待端。
pub struct ReplyFuture<T> {
    inner: Arc<Mutex<SlotInner<T>>>,
}

impl<T> Future for ReplyFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.value.take() {
            inner.taken = true;
            return Poll::Ready(value);
        }
        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

struct QueueInner<T> {
    items: VecDeque<T>,
    closed: bool,
    waker: Option<Waker>,
}

/// 入站消息队列的写入端。
///
/// # 契约说明（What）
/// - `push` 在队列关闭后被丢弃（终态之后不再有消息，由交付闸门保证，
///   此处兜底）；
/// - `close` 幂等，关闭后等待方在排空剩余消息后收到流结束信号。
pub struct MessageQueue<T> {
    inner: Arc<Mutex<QueueInner<T>>>,
}

impl<T> Clone for MessageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> MessageQueue<T> {
    /// 创建写入端与读取端配对。
    pub fn new() -> (Self, MessageStream<T>) {
        let inner = Arc::new(Mutex::new(QueueInner {
            items: VecDeque::new(),
            closed: false,
            waker: None,
        }));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            MessageStream { inner },
        )
    }

    /// 入队一条消息并唤醒等待方。
    pub fn push(&self, item: T) {
        let waker = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.items.push_back(item);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// 关闭队列。幂等。
    pub fn close(&self) {
        let waker = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// 入站消息队列的读取端，按入队顺序产出消息。
pub struct MessageStream<T> {
    inner: Arc<Mutex<QueueInner<T>>>,
}

impl<T> MessageStream<T> {
    /// 轮询下一条消息；队列已关闭且排空时返回 `Ready(None)`。
    pub fn poll_next_message(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut inner = self.inner.lock();
        if let Some(item) = inner.items.pop_front() {
            return Poll::Ready(Some(item));
        }
        if inner.closed {
            return Poll::Ready(None);
        }
        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }

    /// 以 Future 形式等待下一条消息。
    pub fn next(&mut self) -> NextMessage<'_, T> {
        NextMessage { stream: self }
    }
}

impl<T> Stream for MessageStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().poll_next_message(cx)
    }
}

/// `MessageStream::next` 产出的单步等待 Future。
pub struct NextMessage<'a, T> {
    stream: &'a mut MessageStream<T>,
}

impl<T> Future for NextMessage<'_, T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.stream.poll_next_message(cx)
    }
}
