use alloc::borrow::Cow;
use alloc::boxed::Box;
use core::fmt;

use crate::Error;

/// `CallError` 表示调用管线内跨层共享的稳定错误域，是所有同步可观察错误的最终形态。
///
/// # 设计背景（Why）
/// - 元数据误用、状态机违例、拦截器配置冲突等“程序性错误”必须在调用点同步暴露，
///   与作为数据流转的终态 [`Status`](crate::status::Status) 严格分离；
/// - 框架需兼容 `no_std + alloc` 场景，因此不依赖 `std::error::Error`，而是复用 crate
///   内部定义的轻量抽象。
///
/// # 逻辑解析（How）
/// - 错误码 `code` 始终为 `'static` 字符串，承载稳定语义；`message` 面向排障人员；
/// - 通过 `with_cause` 以 Builder 风格叠加底层原因，并经 `source()` 暴露完整链路。
///
/// # 契约说明（What）
/// - **前置条件**：调用方必须使用 [`codes`] 模块或遵循 `<域>.<语义>` 约定的自定义码值。
/// - **返回/后置条件**：构造函数返回拥有所有权的 `CallError`，可安全跨线程移动
///   （`Send + Sync + 'static`）；除非显式调用 `with_cause`，错误不含额外上下文。
///
/// # 设计取舍与风险（Trade-offs）
/// - 远端失败从不以 `CallError` 形态出现：它们只会作为终态 `Status` 通过监听链传递，
///   保证“错误即数据”的调用结果语义不被破坏。
#[derive(Debug)]
pub struct CallError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
}

impl CallError {
    /// 构造调用错误。
    ///
    /// # 契约说明（What）
    /// - `code`：遵循 `<域>.<语义>` 约定的稳定错误码；
    /// - `message`：面向排障人员的自然语言描述，可为 `&'static str` 或堆分配字符串；
    /// - **后置条件**：`cause` 初始化为空，可稍后通过 [`with_cause`](Self::with_cause) 填充。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 附带底层原因并返回新的错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CallError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// `Result` 为调用管线统一的返回值别名，默认错误类型为 [`CallError`]。
///
/// # 设计意图（Why）
/// - 避免在各处重复书写 `Result<_, CallError>` 样板，并提示开发者区分
///   “程序性错误”（此别名）与“调用终态”（`Status`）两条通道。
pub type Result<T, E = CallError> = core::result::Result<T, E>;

/// 框架内置的错误码常量集合，确保可观测性系统具有稳定识别符。
pub mod codes {
    /// 元数据键不满足字符集或后缀规则。
    pub const METADATA_INVALID_KEY: &str = "metadata.invalid_key";
    /// 元数据已冻结，拒绝继续修改。
    pub const METADATA_IMMUTABLE: &str = "metadata.immutable";
    /// 对调用状态机发起了非法操作。
    pub const CALL_STATE_VIOLATION: &str = "call.state_violation";
    /// 同一调用句柄被重复 start。
    pub const CALL_ALREADY_STARTED: &str = "call.already_started";
    /// 同一调用点同时提供 interceptors 与 interceptor_providers。
    pub const CALL_INTERCEPTOR_CONFLICT: &str = "call.interceptor_conflict";
    /// 消息编解码失败（由类型化存根边界上报）。
    pub const CALL_MARSHAL: &str = "call.marshal";
}

const _: fn() = || {
    fn assert_error_traits<T: Error + Send + Sync + 'static>() {}

    assert_error_traits::<CallError>();
};
