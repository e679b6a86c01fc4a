//! 内置拦截器目录：头部注入、透传、重试、缓存与回退。
//!
//! # 设计背景（Why）
//! - 这些拦截器既是开箱即用的组件，也是三类组合契约（重试、短路、回退）
//!   的参考实现：任意自定义拦截器与它们任意叠放，洋葱顺序与事件计数
//!   都必须保持确定；
//! - 全部实现只依赖公开的链路契约，不使用任何核心内部后门。

pub mod backoff;
pub mod cache;
pub mod fallback;
pub mod header;
pub mod retry;

pub use cache::CacheInterceptor;
pub use fallback::FallbackInterceptor;
pub use header::{HeaderInterceptor, ascii_header};
pub use retry::{RetryInterceptor, RetryPolicy};

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::descriptor::CallDescriptor;
use crate::pipeline::chain::{CallInterceptor, InterceptorDescriptor};
use crate::pipeline::handle::{CallFactory, CallHandle};

/// 纯透传拦截器：不改写任何事件，仅在链中占位。
///
/// 常用于两处：为调用点预留日后插入真实逻辑的位置，以及在测试中验证
/// “多一层包装不改变任何可观察行为”。
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughInterceptor;

impl CallInterceptor for PassthroughInterceptor {
    fn descriptor(&self) -> InterceptorDescriptor {
        InterceptorDescriptor::new("passthrough", "structural", "纯透传占位拦截器")
    }

    fn intercept(
        &self,
        descriptor: &CallDescriptor,
        next: Arc<dyn CallFactory>,
    ) -> Box<dyn CallHandle> {
        next.create_call(descriptor)
    }
}
