//! 调用描述符：方法、形状、选项与类型化编解码边界。
//!
//! # 设计背景（Why）
//! - 拦截管线对消息内容完全不可知，链路上流动的是不透明字节载荷；
//!   类型化的 [`Marshaller`] 只出现在存根边界，负责进出链路前后的编解码；
//! - 描述符在调用工厂被触发后即视为不可变：需要不同选项的拦截器必须通过
//!   [`CallDescriptor::to_builder`] 派生**新的**描述符，而非原地修改共享实例。

use alloc::borrow::Cow;
use alloc::sync::Arc;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::contract::{Cancellation, Deadline};
use crate::metadata::Metadata;
use crate::pipeline::chain::{CallInterceptor, InterceptorProvider};

/// 调用形状，决定双向的合法消息数量。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallShape {
    /// 单请求单响应。
    Unary,
    /// 客户端流：0..N 请求 + 半关，单响应。
    ClientStreaming,
    /// 服务端流：单请求，0..N 响应。
    ServerStreaming,
    /// 双向流：两侧均为 0..N 条消息。
    BidiStreaming,
}

impl CallShape {
    /// 客户端侧是否允许多条消息。
    pub const fn client_streams(self) -> bool {
        matches!(self, Self::ClientStreaming | Self::BidiStreaming)
    }

    /// 服务端侧是否允许多条消息。
    pub const fn server_streams(self) -> bool {
        matches!(self, Self::ServerStreaming | Self::BidiStreaming)
    }
}

/// 方法描述：全名与调用形状。
///
/// # 契约说明（What）
/// - `full_name` 采用 `包.服务/方法` 形式的稳定标识，管线不解析其结构，
///   仅用于路由与事件来源标注。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    full_name: Cow<'static, str>,
    shape: CallShape,
}

impl MethodDescriptor {
    /// 构造方法描述。
    pub fn new(full_name: impl Into<Cow<'static, str>>, shape: CallShape) -> Self {
        Self {
            full_name: full_name.into(),
            shape,
        }
    }

    /// 获取方法全名。
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// 获取调用形状。
    pub fn shape(&self) -> CallShape {
        self.shape
    }
}

/// 消息写出标志，随每条出站消息传递给传输层。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFlags {
    /// 提示传输层可缓冲本条消息、延迟刷出。
    pub buffer_hint: bool,
    /// 禁用本条消息的压缩。
    pub no_compress: bool,
}

/// 类型化编解码对，仅存在于存根边界。
///
/// # 设计背景（Why）
/// - 序列化与反序列化由生成代码提供、按消息类型配对；管线本身从不检视消息，
///   因此以不透明闭包对的形式承载，保证核心与具体编码格式解耦。
///
/// # 契约说明（What）
/// - `serialize` 将类型化请求编码为字节；`deserialize` 将入站字节还原为响应；
/// - 编解码失败以 [`codes::CALL_MARSHAL`](crate::error::codes::CALL_MARSHAL)
///   语义的错误同步上报，不进入状态通道。
pub struct Marshaller<Req, Resp> {
    serialize: Arc<dyn Fn(&Req) -> crate::Result<Vec<u8>> + Send + Sync>,
    deserialize: Arc<dyn Fn(&[u8]) -> crate::Result<Resp> + Send + Sync>,
}

impl<Req, Resp> Clone for Marshaller<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            serialize: Arc::clone(&self.serialize),
            deserialize: Arc::clone(&self.deserialize),
        }
    }
}

impl<Req, Resp> Marshaller<Req, Resp> {
    /// 以编解码闭包对构造。
    pub fn new(
        serialize: impl Fn(&Req) -> crate::Result<Vec<u8>> + Send + Sync + 'static,
        deserialize: impl Fn(&[u8]) -> crate::Result<Resp> + Send + Sync + 'static,
    ) -> Self {
        Self {
            serialize: Arc::new(serialize),
            deserialize: Arc::new(deserialize),
        }
    }

    /// 编码请求。
    pub fn serialize(&self, request: &Req) -> crate::Result<Vec<u8>> {
        (self.serialize)(request)
    }

    /// 解码响应。
    pub fn deserialize(&self, payload: &[u8]) -> crate::Result<Resp> {
        (self.deserialize)(payload)
    }
}

/// 调用级选项，由存根在发起调用时一次性提供。
///
/// # 契约说明（What）
/// - `interceptors` 与 `interceptor_providers` 互斥：二者同时非空属配置冲突，
///   调用入口在构造任何调用对象之前即以
///   [`codes::CALL_INTERCEPTOR_CONFLICT`](crate::error::codes::CALL_INTERCEPTOR_CONFLICT)
///   快速失败；
/// - `metadata` 为初始元数据底稿，管线在交付传输层前自行克隆，调用方保留所有权；
/// - `cancellation` 为调用方持有的取消令牌：入口以 [`Cancellation::child`]
///   派生共享同一原子位的描述符令牌，调用表面的取消对调用方令牌同样可见，
///   反之亦然。
#[derive(Clone, Default)]
pub struct CallOptions {
    /// 初始元数据。
    pub metadata: Metadata,
    /// 截止时间。
    pub deadline: Deadline,
    /// 调用方取消令牌。
    pub cancellation: Cancellation,
    /// 是否等待传输层就绪而非立即失败。
    pub wait_for_ready: bool,
    /// 目标机构覆盖（宿主覆盖），`None` 表示使用信道默认目标。
    pub host_override: Option<Cow<'static, str>>,
    /// 入口代为发送请求消息时使用的写出标志（单次 / 服务端流）。
    pub write_flags: WriteFlags,
    /// 显式拦截器列表（索引 0 为最外层）。
    pub interceptors: Vec<Arc<dyn CallInterceptor>>,
    /// 按方法筛选的拦截器提供者列表。
    pub interceptor_providers: Vec<Arc<dyn InterceptorProvider>>,
}

/// 一次调用的不可变描述：方法、宿主覆盖、截止与取消。
///
/// # 逻辑解析（How）
/// - 字段全部私有，仅暴露读访问器；
/// - [`to_builder`](Self::to_builder) 以当前值为底稿生成构建器，供拦截器派生
///   修改后的新描述符（取消令牌经 [`Cancellation::child`] 共享同一原子位，
///   保证外层取消对派生调用同样可见）。
#[derive(Clone, Debug)]
pub struct CallDescriptor {
    method: MethodDescriptor,
    host_override: Option<Cow<'static, str>>,
    deadline: Deadline,
    cancellation: Cancellation,
    wait_for_ready: bool,
}

impl CallDescriptor {
    /// 创建描述符构建器。
    pub fn builder(method: MethodDescriptor) -> CallDescriptorBuilder {
        CallDescriptorBuilder {
            method,
            host_override: None,
            deadline: Deadline::none(),
            cancellation: Cancellation::new(),
            wait_for_ready: false,
        }
    }

    /// 获取方法描述。
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// 获取调用形状。
    pub fn shape(&self) -> CallShape {
        self.method.shape()
    }

    /// 获取宿主覆盖。
    pub fn host_override(&self) -> Option<&str> {
        self.host_override.as_deref()
    }

    /// 获取截止时间。
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// 获取取消令牌。
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// 是否等待传输层就绪。
    pub fn wait_for_ready(&self) -> bool {
        self.wait_for_ready
    }

    /// 以当前值为底稿派生构建器。
    pub fn to_builder(&self) -> CallDescriptorBuilder {
        CallDescriptorBuilder {
            method: self.method.clone(),
            host_override: self.host_override.clone(),
            deadline: self.deadline,
            cancellation: self.cancellation.child(),
            wait_for_ready: self.wait_for_ready,
        }
    }
}

/// `CallDescriptor` 构建器。
pub struct CallDescriptorBuilder {
    method: MethodDescriptor,
    host_override: Option<Cow<'static, str>>,
    deadline: Deadline,
    cancellation: Cancellation,
    wait_for_ready: bool,
}

impl CallDescriptorBuilder {
    /// 替换方法描述。
    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.method = method;
        self
    }

    /// 设置宿主覆盖。
    pub fn with_host_override(mut self, host: impl Into<Cow<'static, str>>) -> Self {
        self.host_override = Some(host.into());
        self
    }

    /// 设置截止时间。
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// 设置取消令牌。
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// 设置是否等待传输层就绪。
    pub fn with_wait_for_ready(mut self, wait_for_ready: bool) -> Self {
        self.wait_for_ready = wait_for_ready;
        self
    }

    /// 构建不可变描述符。
    pub fn build(self) -> CallDescriptor {
        CallDescriptor {
            method: self.method,
            host_override: self.host_override,
            deadline: self.deadline,
            cancellation: self.cancellation,
            wait_for_ready: self.wait_for_ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_method() -> MethodDescriptor {
        MethodDescriptor::new("demo.Echo/Echo", CallShape::Unary)
    }

    #[test]
    fn shape_stream_flags_match_table() {
        assert!(!CallShape::Unary.client_streams());
        assert!(!CallShape::Unary.server_streams());
        assert!(CallShape::ClientStreaming.client_streams());
        assert!(!CallShape::ClientStreaming.server_streams());
        assert!(!CallShape::ServerStreaming.client_streams());
        assert!(CallShape::ServerStreaming.server_streams());
        assert!(CallShape::BidiStreaming.client_streams());
        assert!(CallShape::BidiStreaming.server_streams());
    }

    #[test]
    fn derived_descriptor_shares_cancellation_bit() {
        let outer = CallDescriptor::builder(echo_method()).build();
        let derived = outer
            .to_builder()
            .with_host_override("backup.example")
            .build();
        assert!(outer.cancellation().cancel());
        assert!(derived.cancellation().is_cancelled());
        assert_eq!(derived.host_override(), Some("backup.example"));
        assert!(outer.host_override().is_none());
    }

    #[test]
    fn marshaller_round_trips_through_closures() {
        let marshaller: Marshaller<u32, u32> = Marshaller::new(
            |req: &u32| Ok(req.to_be_bytes().into()),
            |bytes| {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                Ok(u32::from_be_bytes(buf))
            },
        );
        let bytes = marshaller.serialize(&7).unwrap();
        assert_eq!(marshaller.deserialize(&bytes).unwrap(), 7);
    }
}
