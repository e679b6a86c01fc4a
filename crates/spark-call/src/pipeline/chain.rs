//! 拦截器链装配：把有序拦截器列表折叠为单个调用工厂。
//!
//! # 设计背景（Why）
//! - 配置顺序即“外到内”顺序：索引 0 为最外层；
//! - 装配从最内层（传输终端工厂）向外折叠：先以 interceptor[N-1] 包装终端，
//!   再以 interceptor[N-2] 包装结果，依次类推，最终返回 interceptor[0]
//!   所在的最外层工厂；
//! - 由此触发外层工厂时，各拦截器的 `intercept` 自外向内依次执行（每层同步
//!   向内索取下一层句柄），而入站事件经由监听器包装自内向外回传——
//!   这一对称的洋葱顺序是整条管线的中心不变量。

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::descriptor::{CallDescriptor, MethodDescriptor};
use crate::error::{CallError, codes};
use crate::pipeline::handle::{CallFactory, CallHandle};

/// 拦截器元信息，用于事件标注与链路调试。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterceptorDescriptor {
    /// 拦截器名称。
    pub name: Cow<'static, str>,
    /// 所属类别（如 `retry`、`cache`、`auth`）。
    pub category: Cow<'static, str>,
    /// 一句话功能摘要。
    pub summary: Cow<'static, str>,
}

impl InterceptorDescriptor {
    /// 构造元信息。
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        category: impl Into<Cow<'static, str>>,
        summary: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            summary: summary.into(),
        }
    }

    /// 匿名占位元信息，供未覆盖 `descriptor` 的拦截器使用。
    pub fn anonymous() -> Self {
        Self::new("anonymous", "uncategorized", "未提供描述的拦截器")
    }
}

/// 调用拦截器：围绕下一层工厂构造拦截调用的纯函数式组件。
///
/// # 契约说明（What）
/// - `intercept` 必须恰好调用一次 `next.create_call`（有意永不发起 RPC、
///   直接返回罐装结果的拦截器除外），并将产出的内层句柄包装后返回；
/// - 需要不同调用选项的实现应通过
///   [`CallDescriptor::to_builder`] 派生新描述符传给内层，而非修改共享实例；
/// - 实现需 `Send + Sync`：同一拦截器实例会被多次调用复用。
pub trait CallInterceptor: Send + Sync {
    /// 返回元信息。默认匿名。
    fn descriptor(&self) -> InterceptorDescriptor {
        InterceptorDescriptor::anonymous()
    }

    /// 围绕下一层工厂构造本层调用句柄。
    fn intercept(
        &self,
        descriptor: &CallDescriptor,
        next: Arc<dyn CallFactory>,
    ) -> Box<dyn CallHandle>;
}

/// 按方法筛选拦截器的提供者。
///
/// # 契约说明（What）
/// - 返回 `None` 表示该方法不需要本提供者的拦截器；
/// - 提供者列表与显式拦截器列表在同一调用点互斥（见 [`validate_configuration`]）。
pub trait InterceptorProvider: Send + Sync {
    /// 为给定方法决定是否提供拦截器。
    fn provide(&self, method: &MethodDescriptor) -> Option<Arc<dyn CallInterceptor>>;
}

/// 校验调用点配置：显式列表与提供者列表不得同时非空。
///
/// # 契约说明（What）
/// - 冲突时返回 [`codes::CALL_INTERCEPTOR_CONFLICT`]，调用入口应在构造任何
///   调用对象之前传播该错误（快速失败，不产生任何网络活动）。
pub fn validate_configuration(
    interceptors: &[Arc<dyn CallInterceptor>],
    providers: &[Arc<dyn InterceptorProvider>],
) -> crate::Result<()> {
    if !interceptors.is_empty() && !providers.is_empty() {
        return Err(CallError::new(
            codes::CALL_INTERCEPTOR_CONFLICT,
            "interceptors 与 interceptor_providers 不能在同一调用点同时提供",
        ));
    }
    Ok(())
}

/// 依据方法对提供者求值，得到生效的拦截器列表（保持提供者顺序）。
pub fn resolve_providers(
    providers: &[Arc<dyn InterceptorProvider>],
    method: &MethodDescriptor,
) -> Vec<Arc<dyn CallInterceptor>> {
    providers
        .iter()
        .filter_map(|provider| provider.provide(method))
        .collect()
}

/// 把拦截器列表折叠到终端工厂之上，返回最外层工厂。
///
/// # 逻辑解析（How）
/// - 自列表尾部向头部迭代：每一步以 [`InterceptedFactory`] 把当前拦截器
///   包在既有工厂外面；
/// - 空列表直接返回终端工厂本身，不引入额外包装层。
pub fn assemble(
    interceptors: &[Arc<dyn CallInterceptor>],
    terminal: Arc<dyn CallFactory>,
) -> Arc<dyn CallFactory> {
    let mut factory = terminal;
    for interceptor in interceptors.iter().rev() {
        factory = Arc::new(InterceptedFactory {
            interceptor: Arc::clone(interceptor),
            next: factory,
        });
    }
    factory
}

/// 单层包装：把一个拦截器与它的下一层工厂绑定为新工厂。
struct InterceptedFactory {
    interceptor: Arc<dyn CallInterceptor>,
    next: Arc<dyn CallFactory>,
}

impl CallFactory for InterceptedFactory {
    fn create_call(&self, descriptor: &CallDescriptor) -> Box<dyn CallHandle> {
        self.interceptor
            .intercept(descriptor, Arc::clone(&self.next))
    }
}
