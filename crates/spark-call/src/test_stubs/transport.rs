//! 脚本化传输桩：按剧本交付入站事件并记录全部出站操作。

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::descriptor::{CallDescriptor, WriteFlags};
use crate::metadata::Metadata;
use crate::pipeline::handle::{CallFactory, CallHandle, CallListener};
use crate::pipeline::state::{CallSignal, CallStateMachine};
use crate::status::{Status, StatusCode};

/// 单次调用的应答剧本。
#[derive(Clone)]
pub enum ReplyScript {
    /// 回显：镜像收到的元数据并回显出站载荷，`OK` 收尾。
    /// 服务端可多消息的形状逐条回显，否则拼接为单条响应。
    Echo,
    /// 仅交付一个失败终态（不发头、不发消息）。
    Fail(StatusCode),
    /// 永不应答：半关后保持悬挂，仅响应取消。
    Silent,
    /// 固定应答：依次交付给定的头、消息序列与终态。
    Reply {
        /// 响应头。
        headers: Metadata,
        /// 响应消息序列。
        messages: Vec<Vec<u8>>,
        /// 终态。
        status: Status,
    },
}

struct MockShared {
    scripts: VecDeque<ReplyScript>,
    created: usize,
    started: usize,
    operations: Vec<String>,
}

/// 脚本化传输桩，实现链路最底端的终端工厂。
///
/// # 逻辑解析（How）
/// - 每次 `create_call` 依序弹出一个剧本（耗尽后回退为 [`ReplyScript::Echo`]）；
/// - 产出的句柄在底端内嵌 [`CallStateMachine`]，对非法序列与真实传输一样报错；
/// - 入站事件在 `half_close` 时同步交付，保证测试的事件顺序完全确定；
/// - 构造数、启动数与操作日志可随时查询，供断言“传输层到底看到了什么”。
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<Mutex<MockShared>>,
}

impl MockTransport {
    /// 创建始终回显的传输桩。
    pub fn new() -> Self {
        Self::with_scripts(Vec::new())
    }

    /// 以剧本序列创建传输桩。
    pub fn with_scripts(scripts: Vec<ReplyScript>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(MockShared {
                scripts: scripts.into(),
                created: 0,
                started: 0,
                operations: Vec::new(),
            })),
        }
    }

    /// 已构造的句柄数。
    pub fn created_calls(&self) -> usize {
        self.shared.lock().created
    }

    /// 已被 `start` 的句柄数。
    pub fn started_calls(&self) -> usize {
        self.shared.lock().started
    }

    /// 按时间顺序返回全部出站操作日志。
    pub fn operations(&self) -> Vec<String> {
        self.shared.lock().operations.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CallFactory for MockTransport {
    fn create_call(&self, descriptor: &CallDescriptor) -> Box<dyn CallHandle> {
        let mut shared = self.shared.lock();
        shared.created += 1;
        let script = shared.scripts.pop_front().unwrap_or(ReplyScript::Echo);
        Box::new(MockHandle {
            shared: Arc::clone(&self.shared),
            script,
            method: descriptor.method().full_name().to_owned(),
            machine: CallStateMachine::new(descriptor.shape()),
            listener: None,
            received_metadata: None,
            sent: Vec::new(),
            finished: false,
        })
    }
}

struct MockHandle {
    shared: Arc<Mutex<MockShared>>,
    script: ReplyScript,
    method: String,
    machine: CallStateMachine,
    listener: Option<Box<dyn CallListener>>,
    received_metadata: Option<Metadata>,
    sent: Vec<Vec<u8>>,
    finished: bool,
}

impl MockHandle {
    fn log(&self, op: &str) {
        let mut shared = self.shared.lock();
        let method = &self.method;
        shared.operations.push(format!("{op} {method}"));
    }

    /// 半关后按剧本交付入站事件。交付给监听器前先驱动状态机，
    /// 保证桩自身也遵守“元数据 → 消息 → 终态”的合法序列。
    fn resolve(&mut self) {
        if matches!(self.script, ReplyScript::Silent) {
            return;
        }
        let Some(mut listener) = self.listener.take() else {
            return;
        };
        self.finished = true;
        match core::mem::replace(&mut self.script, ReplyScript::Echo) {
            ReplyScript::Silent => {}
            ReplyScript::Echo => {
                let headers = self.received_metadata.take().unwrap_or_default();
                listener.on_metadata(headers);
                let sent = core::mem::take(&mut self.sent);
                if self.machine.shape().server_streams() {
                    for payload in sent {
                        let _ = self.machine.apply(CallSignal::InboundMessage);
                        listener.on_message(payload);
                    }
                } else {
                    let mut joined = Vec::new();
                    for payload in &sent {
                        joined.extend_from_slice(payload);
                    }
                    let _ = self.machine.apply(CallSignal::InboundMessage);
                    listener.on_message(joined);
                }
                let _ = self.machine.apply(CallSignal::Terminate);
                listener.on_status(Status::ok());
            }
            ReplyScript::Fail(code) => {
                let _ = self.machine.apply(CallSignal::Terminate);
                listener.on_status(Status::new(code, "scripted failure"));
            }
            ReplyScript::Reply {
                headers,
                messages,
                status,
            } => {
                listener.on_metadata(headers);
                for payload in messages {
                    let _ = self.machine.apply(CallSignal::InboundMessage);
                    listener.on_message(payload);
                }
                let _ = self.machine.apply(CallSignal::Terminate);
                listener.on_status(status);
            }
        }
    }
}

impl CallHandle for MockHandle {
    fn start(&mut self, metadata: Metadata, listener: Box<dyn CallListener>) -> crate::Result<()> {
        self.machine.apply(CallSignal::Start)?;
        self.log("start");
        self.shared.lock().started += 1;
        self.received_metadata = Some(metadata);
        self.listener = Some(listener);
        Ok(())
    }

    fn send_message(&mut self, payload: Vec<u8>, _flags: WriteFlags) -> crate::Result<()> {
        self.machine.apply(CallSignal::SendMessage)?;
        self.log("send");
        self.sent.push(payload);
        Ok(())
    }

    fn half_close(&mut self) -> crate::Result<()> {
        self.machine.apply(CallSignal::HalfClose)?;
        self.log("half_close");
        self.resolve();
        Ok(())
    }

    fn cancel(&mut self, reason: &str) {
        self.log("cancel");
        if self.finished {
            return;
        }
        self.finished = true;
        let _ = self.machine.apply(CallSignal::Terminate);
        if let Some(mut listener) = self.listener.take() {
            listener.on_status(Status::cancelled(alloc::borrow::Cow::Owned(reason.into())));
        }
    }
}
