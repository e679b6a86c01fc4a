//! 调用终态：状态码、可读消息与尾部元数据三元组。
//!
//! # 设计背景（Why）
//! - 远端失败遵循“错误即数据”原则：它们只会作为终态 [`Status`] 沿监听链传递，
//!   而不会从发送路径以 [`CallError`](crate::error::CallError) 形式抛出；
//! - 状态码数值与主流 RPC 生态保持一致，便于跨协议映射与日志比对。

use alloc::borrow::Cow;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

/// 标准调用状态码。
///
/// # 契约说明（What）
/// - 数值表示固定不变，是跨进程与跨语言对齐的稳定标识；
/// - `Ok` 表示成功终态，其余一律视为失败。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StatusCode {
    /// 成功。
    Ok = 0,
    /// 调用被取消（通常由调用方发起）。
    Cancelled = 1,
    /// 未知错误。
    Unknown = 2,
    /// 参数非法。
    InvalidArgument = 3,
    /// 截止时间已过。
    DeadlineExceeded = 4,
    /// 目标不存在。
    NotFound = 5,
    /// 目标已存在。
    AlreadyExists = 6,
    /// 权限不足。
    PermissionDenied = 7,
    /// 资源耗尽。
    ResourceExhausted = 8,
    /// 前置条件不满足。
    FailedPrecondition = 9,
    /// 操作被中止（并发冲突等）。
    Aborted = 10,
    /// 超出有效范围。
    OutOfRange = 11,
    /// 功能未实现。
    Unimplemented = 12,
    /// 内部错误。
    Internal = 13,
    /// 服务不可用。
    Unavailable = 14,
    /// 不可恢复的数据丢失或损坏。
    DataLoss = 15,
    /// 未通过身份认证。
    Unauthenticated = 16,
}

impl StatusCode {
    /// 返回稳定数值表示。
    pub const fn as_code(self) -> u8 {
        self as u8
    }

    /// 从稳定数值还原状态码；越界数值返回 `None`。
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Ok,
            1 => Self::Cancelled,
            2 => Self::Unknown,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition,
            10 => Self::Aborted,
            11 => Self::OutOfRange,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            _ => return None,
        })
    }

    /// 是否为成功码。
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// 返回规范名称（全大写蛇形），用于日志与事件。
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 调用终态三元组：状态码、可读消息与尾部元数据。
///
/// # 契约说明（What）
/// - 每次调用**恰好**交付一个终态；重复交付由管线的交付闸门去重
///   （首个终态胜出，后到者被丢弃并上报事件）；
/// - `message` 面向排障人员，不承载程序性语义；
/// - `trailers` 为终态附带的尾部元数据，交付前由管线冻结。
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    code: StatusCode,
    message: Cow<'static, str>,
    trailers: Metadata,
}

impl Status {
    /// 构造终态。
    pub fn new(code: StatusCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            trailers: Metadata::new(),
        }
    }

    /// 构造成功终态。
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    /// 构造取消终态。
    pub fn cancelled(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::Cancelled, reason)
    }

    /// 替换可读消息。
    pub fn with_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = message.into();
        self
    }

    /// 附带尾部元数据。
    pub fn with_trailers(mut self, trailers: Metadata) -> Self {
        self.trailers = trailers;
        self
    }

    /// 获取状态码。
    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// 获取消息。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取尾部元数据。
    pub fn trailers(&self) -> &Metadata {
        &self.trailers
    }

    /// 取出尾部元数据的所有权。
    pub fn into_trailers(self) -> Metadata {
        self.trailers
    }

    /// 冻结尾部元数据。交付前由管线调用，幂等。
    pub fn freeze_trailers(&mut self) {
        self.trailers.freeze();
    }

    /// 是否为成功终态。
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}
