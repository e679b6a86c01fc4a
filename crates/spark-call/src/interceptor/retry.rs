//! 重试拦截器：对可重试的失败终态重放缓冲的出站序列。
//!
//! # 设计背景（Why）
//! - 重试以拦截器形态表达，对其上层完全透明：无论内部发生多少次尝试，
//!   上层监听器只会收到一次终态、一套入站事件；
//! - 每次尝试都通过**同一**下层工厂索取全新句柄，绝不复用已终结的句柄；
//! - 一旦某次尝试的入站元数据或消息已向上层转发，该调用即“已承诺”，
//!   后续失败不再重试（事件不可撤回）。

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;

use core::time::Duration;

use spin::Mutex;

use crate::descriptor::{CallDescriptor, WriteFlags};
use crate::error::{CallError, codes};
use crate::interceptor::backoff;
use crate::metadata::Metadata;
use crate::observability::{CallEvent, CallEventKind, NoopEventSink, SharedEventSink};
use crate::pipeline::chain::{CallInterceptor, InterceptorDescriptor};
use crate::pipeline::handle::{CallFactory, CallHandle, CallListener};
use crate::status::{Status, StatusCode};

/// 重试策略：尝试预算、基础退避与可重试状态码集合。
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
    retryable: Vec<StatusCode>,
}

impl RetryPolicy {
    /// 以尝试预算与基础退避构造策略，可重试码默认为
    /// `UNAVAILABLE` / `UNKNOWN` / `ABORTED` / `RESOURCE_EXHAUSTED`。
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
            retryable: alloc::vec![
                StatusCode::Unavailable,
                StatusCode::Unknown,
                StatusCode::Aborted,
                StatusCode::ResourceExhausted,
            ],
        }
    }

    /// 覆盖可重试状态码集合。
    pub fn with_retryable(mut self, codes: Vec<StatusCode>) -> Self {
        self.retryable = codes;
        self
    }

    /// 总尝试预算（含首次尝试）。
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 判断状态码是否可重试。
    pub fn is_retryable(&self, code: StatusCode) -> bool {
        !code.is_ok() && self.retryable.contains(&code)
    }

    /// 计算第 `attempt` 次重试的建议等待窗口。
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        backoff::compute(attempt, self.base_backoff)
    }
}

/// 重试拦截器。
pub struct RetryInterceptor {
    policy: RetryPolicy,
    sink: SharedEventSink,
}

impl RetryInterceptor {
    /// 以策略构造，事件默认丢弃。
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sink: Arc::new(NoopEventSink),
        }
    }

    /// 注入事件接收器。
    pub fn with_event_sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = sink;
        self
    }
}

impl CallInterceptor for RetryInterceptor {
    fn descriptor(&self) -> InterceptorDescriptor {
        InterceptorDescriptor::new("retry", "resilience", "对可重试失败重放缓冲的出站序列")
    }

    fn intercept(
        &self,
        descriptor: &CallDescriptor,
        next: Arc<dyn CallFactory>,
    ) -> Box<dyn CallHandle> {
        Box::new(RetryCall {
            shared: Arc::new(RetryShared {
                factory: next,
                descriptor: descriptor.clone(),
                policy: self.policy.clone(),
                sink: Arc::clone(&self.sink),
                state: Mutex::new(RetryState::default()),
            }),
        })
    }
}

type SharedHandle = Arc<Mutex<Box<dyn CallHandle>>>;

struct RetryShared {
    factory: Arc<dyn CallFactory>,
    descriptor: CallDescriptor,
    policy: RetryPolicy,
    sink: SharedEventSink,
    state: Mutex<RetryState>,
}

#[derive(Default)]
struct RetryState {
    outer: Option<Box<dyn CallListener>>,
    metadata: Option<Metadata>,
    sends: Vec<(Vec<u8>, WriteFlags)>,
    half_closed: bool,
    attempt: u32,
    committed: bool,
    cancelled: bool,
    current: Option<SharedHandle>,
}

impl RetryShared {
    /// 构造并启动一次新尝试，重放已缓冲的出站序列。
    ///
    /// 约束：调用期间**不得**持有 `state` 锁——新尝试可能同步交付终态并
    /// 重入监听器。句柄在 `start` 之前写入 `state.current`，保证取消路径
    /// 始终指向最新尝试。
    fn launch_attempt(
        self: &Arc<Self>,
        metadata: Metadata,
        sends: Vec<(Vec<u8>, WriteFlags)>,
        half_closed: bool,
    ) -> crate::Result<()> {
        let handle: SharedHandle =
            Arc::new(Mutex::new(self.factory.create_call(&self.descriptor)));
        self.state.lock().current = Some(Arc::clone(&handle));

        let listener = Box::new(RetryListener {
            shared: Arc::clone(self),
        });
        handle.lock().start(metadata, listener)?;
        for (payload, flags) in sends {
            handle.lock().send_message(payload, flags)?;
        }
        if half_closed {
            handle.lock().half_close()?;
        }
        Ok(())
    }

    fn deliver(&self, status: Status) {
        let mut state = self.state.lock();
        if let Some(outer) = state.outer.as_mut() {
            outer.on_status(status);
        }
    }
}

/// 重试拦截器产出的调用句柄。
struct RetryCall {
    shared: Arc<RetryShared>,
}

impl CallHandle for RetryCall {
    fn start(&mut self, metadata: Metadata, listener: Box<dyn CallListener>) -> crate::Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.outer.is_some() {
                return Err(CallError::new(
                    codes::CALL_ALREADY_STARTED,
                    "调用已启动，不允许重复 start",
                ));
            }
            state.outer = Some(listener);
            state.metadata = Some(metadata.clone());
            state.attempt = 1;
        }
        self.shared
            .launch_attempt(metadata, Vec::new(), false)
    }

    fn send_message(&mut self, payload: Vec<u8>, flags: WriteFlags) -> crate::Result<()> {
        let handle = {
            let mut state = self.shared.state.lock();
            state.sends.push((payload.clone(), flags));
            state.current.clone()
        };
        match handle {
            Some(handle) => handle.lock().send_message(payload, flags),
            None => Err(CallError::new(
                codes::CALL_STATE_VIOLATION,
                "start 之前不允许发送消息",
            )),
        }
    }

    fn half_close(&mut self) -> crate::Result<()> {
        let handle = {
            let mut state = self.shared.state.lock();
            state.half_closed = true;
            state.current.clone()
        };
        match handle {
            Some(handle) => handle.lock().half_close(),
            None => Err(CallError::new(
                codes::CALL_STATE_VIOLATION,
                "start 之前不允许半关",
            )),
        }
    }

    fn cancel(&mut self, reason: &str) {
        let handle = {
            let mut state = self.shared.state.lock();
            state.cancelled = true;
            state.current.clone()
        };
        if let Some(handle) = handle {
            handle.lock().cancel(reason);
        }
    }
}

/// 每次尝试注册到内层的监听器。
struct RetryListener {
    shared: Arc<RetryShared>,
}

enum StatusPlan {
    Deliver,
    Retry {
        attempt: u32,
        metadata: Metadata,
        sends: Vec<(Vec<u8>, WriteFlags)>,
        half_closed: bool,
    },
}

impl CallListener for RetryListener {
    fn on_metadata(&mut self, metadata: Metadata) {
        let mut state = self.shared.state.lock();
        state.committed = true;
        if let Some(outer) = state.outer.as_mut() {
            outer.on_metadata(metadata);
        }
    }

    fn on_message(&mut self, payload: Vec<u8>) {
        let mut state = self.shared.state.lock();
        state.committed = true;
        if let Some(outer) = state.outer.as_mut() {
            outer.on_message(payload);
        }
    }

    fn on_status(&mut self, status: Status) {
        let plan = {
            let mut state = self.shared.state.lock();
            let exhausted = state.attempt >= self.shared.policy.max_attempts();
            if status.is_ok()
                || state.committed
                || state.cancelled
                || exhausted
                || !self.shared.policy.is_retryable(status.code())
            {
                StatusPlan::Deliver
            } else {
                state.attempt += 1;
                StatusPlan::Retry {
                    attempt: state.attempt,
                    metadata: state.metadata.clone().unwrap_or_default(),
                    sends: state.sends.clone(),
                    half_closed: state.half_closed,
                }
            }
        };

        match plan {
            StatusPlan::Deliver => self.shared.deliver(status),
            StatusPlan::Retry {
                attempt,
                metadata,
                sends,
                half_closed,
            } => {
                let wait = self.shared.policy.backoff_for(attempt - 1);
                self.shared.sink.record(
                    CallEvent::new(
                        CallEventKind::RetryAttempt,
                        self.shared.descriptor.method().full_name().to_owned(),
                    )
                    .with_note(format!("attempt {attempt}, advisory backoff {wait:?}")),
                );
                if self
                    .shared
                    .launch_attempt(metadata, sends, half_closed)
                    .is_err()
                {
                    // 重放失败属本地程序性错误，以 INTERNAL 终态收尾，避免上层悬挂。
                    self.shared
                        .deliver(Status::new(StatusCode::Internal, "重试重放失败"));
                }
            }
        }
    }
}
