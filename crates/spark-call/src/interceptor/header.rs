//! 头部注入拦截器：在 `start` 前向初始元数据追加固定键值。

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;

use crate::descriptor::CallDescriptor;
use crate::metadata::{Metadata, MetadataValue};
use crate::pipeline::chain::{CallInterceptor, InterceptorDescriptor};
use crate::pipeline::handle::{CallFactory, CallHandle, CallListener};
use crate::pipeline::intercepting::{InterceptingCall, Requester};

/// 向每次调用的初始元数据注入一条固定键值。
///
/// # 契约说明（What）
/// - 键在构造时即按元数据规则校验，非法键让配置阶段快速失败，
///   而不是等到第一次调用；
/// - 注入发生在 `start` 钩子内，对内层与传输层完全透明。
#[derive(Debug)]
pub struct HeaderInterceptor {
    key: String,
    value: MetadataValue,
}

impl HeaderInterceptor {
    /// 构造拦截器，键不合法时返回
    /// [`codes::METADATA_INVALID_KEY`](crate::error::codes::METADATA_INVALID_KEY)。
    pub fn new(key: impl Into<String>, value: MetadataValue) -> crate::Result<Self> {
        let key = key.into();
        // 以一次试写完成键与值载体的全部校验。
        let mut probe = Metadata::new();
        probe.insert(key.clone(), value.clone())?;
        Ok(Self { key, value })
    }
}

impl CallInterceptor for HeaderInterceptor {
    fn descriptor(&self) -> InterceptorDescriptor {
        InterceptorDescriptor::new("header", "metadata", "向初始元数据注入固定键值")
    }

    fn intercept(
        &self,
        descriptor: &CallDescriptor,
        next: Arc<dyn CallFactory>,
    ) -> Box<dyn CallHandle> {
        let inner = next.create_call(descriptor);
        Box::new(InterceptingCall::with_requester(
            inner,
            Box::new(HeaderRequester {
                key: self.key.clone(),
                value: self.value.clone(),
            }),
        ))
    }
}

struct HeaderRequester {
    key: String,
    value: MetadataValue,
}

impl Requester for HeaderRequester {
    fn start(
        &mut self,
        mut metadata: Metadata,
        listener: Box<dyn CallListener>,
        next: &mut dyn CallHandle,
    ) -> crate::Result<()> {
        metadata.insert(self.key.clone(), self.value.clone())?;
        next.start(metadata, listener)
    }
}

/// 供 [`HeaderInterceptor::new`] 之外的调用点使用的文本值便捷构造。
pub fn ascii_header(
    key: impl Into<String>,
    value: impl Into<Cow<'static, str>>,
) -> crate::Result<HeaderInterceptor> {
    HeaderInterceptor::new(key, MetadataValue::ascii(value.into().into_owned()))
}
