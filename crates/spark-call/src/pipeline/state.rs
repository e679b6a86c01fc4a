//! 流式调用状态机：按调用形状裁决合法操作序列。
//!
//! # 设计背景（Why）
//! - 四种调用形状对两侧消息数量的约束各不相同，必须在非法调用发生的当下
//!   同步拒绝，而不是推迟到传输层；
//! - 判定表（发送数 / 接收数 / 终态转移）：
//!
//! | 形状 | 合法发送数 | 合法接收数 |
//! |---|---|---|
//! | 单次 | 恰好 1 | 恰好 1 |
//! | 客户端流 | 0..N 后半关 | 恰好 1 |
//! | 服务端流 | 恰好 1 | 0..N |
//! | 双向流 | 0..N 后半关 | 0..N |
//!
//! 任何形状下，终态交付后一切收发均非法。

use crate::contract::{ContractStateMachine, StateAdvance};
use crate::descriptor::CallShape;
use crate::error::{CallError, codes};

/// 调用生命周期阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallPhase {
    /// 已构造，尚未 start。
    Created,
    /// 已 start，收发进行中。
    Started,
    /// 客户端已半关，仍可接收。
    HalfClosed,
    /// 终态已交付，一切收发结束。
    Finished,
}

/// 驱动状态机的调用信号。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallSignal {
    /// 发起调用。
    Start,
    /// 发送一条出站消息。
    SendMessage,
    /// 客户端半关。
    HalfClose,
    /// 收到一条入站消息。
    InboundMessage,
    /// 终态交付。
    Terminate,
}

/// 单次调用的状态机实例。
///
/// # 契约说明（What）
/// - [`apply`](Self::apply) 是带校验的主入口：非法信号返回
///   [`codes::CALL_STATE_VIOLATION`]（重复 start 返回
///   [`codes::CALL_ALREADY_STARTED`]）且**不改变**内部状态；
/// - [`ContractStateMachine::on_signal`] 为无错接口适配：非法信号折算为
///   `Noop`，需要错误细节的调用方应使用 `apply`；
/// - **并发约束**：实例本身不加锁，由持有方（调用表面或交付闸门）串行驱动。
#[derive(Debug)]
pub struct CallStateMachine {
    shape: CallShape,
    phase: CallPhase,
    sent: usize,
    received: usize,
}

impl CallStateMachine {
    /// 为给定形状创建处于 `Created` 阶段的状态机。
    pub fn new(shape: CallShape) -> Self {
        Self {
            shape,
            phase: CallPhase::Created,
            sent: 0,
            received: 0,
        }
    }

    /// 读取调用形状。
    pub fn shape(&self) -> CallShape {
        self.shape
    }

    /// 读取当前阶段。
    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    /// 校验并推进状态。
    pub fn apply(&mut self, signal: CallSignal) -> crate::Result<StateAdvance<CallPhase>> {
        match signal {
            CallSignal::Start => self.on_start(),
            CallSignal::SendMessage => self.on_send(),
            CallSignal::HalfClose => self.on_half_close(),
            CallSignal::InboundMessage => self.on_inbound(),
            CallSignal::Terminate => self.on_terminate(),
        }
    }

    fn on_start(&mut self) -> crate::Result<StateAdvance<CallPhase>> {
        match self.phase {
            CallPhase::Created => {
                self.phase = CallPhase::Started;
                Ok(StateAdvance::Transition {
                    from: CallPhase::Created,
                    to: CallPhase::Started,
                })
            }
            CallPhase::Started | CallPhase::HalfClosed => Err(CallError::new(
                codes::CALL_ALREADY_STARTED,
                "调用已启动，不允许重复 start",
            )),
            CallPhase::Finished => Err(CallError::new(
                codes::CALL_STATE_VIOLATION,
                "调用已终结，不允许 start",
            )),
        }
    }

    fn on_send(&mut self) -> crate::Result<StateAdvance<CallPhase>> {
        if self.phase != CallPhase::Started {
            return Err(CallError::new(
                codes::CALL_STATE_VIOLATION,
                match self.phase {
                    CallPhase::Created => "start 之前不允许发送消息",
                    CallPhase::HalfClosed => "半关之后不允许发送消息",
                    _ => "调用已终结，不允许发送消息",
                },
            ));
        }
        if !self.shape.client_streams() && self.sent >= 1 {
            return Err(CallError::new(
                codes::CALL_STATE_VIOLATION,
                "该调用形状最多发送一条请求消息",
            ));
        }
        self.sent += 1;
        Ok(StateAdvance::Noop { state: self.phase })
    }

    fn on_half_close(&mut self) -> crate::Result<StateAdvance<CallPhase>> {
        match self.phase {
            CallPhase::Started => {
                self.phase = CallPhase::HalfClosed;
                Ok(StateAdvance::Transition {
                    from: CallPhase::Started,
                    to: CallPhase::HalfClosed,
                })
            }
            CallPhase::Created => Err(CallError::new(
                codes::CALL_STATE_VIOLATION,
                "start 之前不允许半关",
            )),
            CallPhase::HalfClosed => Err(CallError::new(
                codes::CALL_STATE_VIOLATION,
                "半关仅合法一次",
            )),
            CallPhase::Finished => Err(CallError::new(
                codes::CALL_STATE_VIOLATION,
                "调用已终结，不允许半关",
            )),
        }
    }

    fn on_inbound(&mut self) -> crate::Result<StateAdvance<CallPhase>> {
        match self.phase {
            CallPhase::Started | CallPhase::HalfClosed => {}
            CallPhase::Created => {
                return Err(CallError::new(
                    codes::CALL_STATE_VIOLATION,
                    "start 之前不会有入站消息",
                ));
            }
            CallPhase::Finished => {
                return Err(CallError::new(
                    codes::CALL_STATE_VIOLATION,
                    "终态之后不允许接收消息",
                ));
            }
        }
        if !self.shape.server_streams() && self.received >= 1 {
            return Err(CallError::new(
                codes::CALL_STATE_VIOLATION,
                "该调用形状最多接收一条响应消息",
            ));
        }
        self.received += 1;
        Ok(StateAdvance::Noop { state: self.phase })
    }

    fn on_terminate(&mut self) -> crate::Result<StateAdvance<CallPhase>> {
        if self.phase == CallPhase::Finished {
            return Err(CallError::new(
                codes::CALL_STATE_VIOLATION,
                "终态仅交付一次",
            ));
        }
        let from = self.phase;
        self.phase = CallPhase::Finished;
        Ok(StateAdvance::Transition {
            from,
            to: CallPhase::Finished,
        })
    }
}

impl ContractStateMachine for CallStateMachine {
    type State = CallPhase;
    type Signal = CallSignal;

    fn state(&self) -> CallPhase {
        self.phase
    }

    fn on_signal(&mut self, signal: &CallSignal) -> StateAdvance<CallPhase> {
        match self.apply(*signal) {
            Ok(advance) => advance,
            Err(_) => StateAdvance::Noop { state: self.phase },
        }
    }
}
