//! 内部 sealed 模块用于控制外部扩展边界。
//!
//! # 设计背景（Why）
//! - `spark-call` 向外暴露大量可实现的 Trait，需要在 SemVer 框架下保持未来演进空间。
//! - 通过统一的 `Sealed` 标记，我们能够在不破坏公开 API 的情况下，为 Trait 增加默认方法或强化约束。
//!
//! # 逻辑解析（How）
//! - 定义私有模块级 Trait `Sealed`，并对所有类型提供 blanket 实现。
//! - 对外可实现的 Trait 通过 `: crate::sealed::Sealed` 间接依赖该标记，从而确保调用方无法绕过框架的演化控制。
//!
//! # 风险与考量（Trade-offs）
//! - Blanket 实现意味着当前不会限制实现者；这是为了兼容拦截器插件生态。
//! - 如果未来收紧条件，需要同步发布兼容性公告，并提供迁移指南以避免破坏性升级。
pub(crate) trait Sealed {}

impl<T: ?Sized> Sealed for T {}
