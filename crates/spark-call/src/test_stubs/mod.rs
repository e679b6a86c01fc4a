//! 测试桩命名空间，集中暴露官方维护的脚本化传输与记录型桩，供集成测试与示例复用。
//!
//! # 设计背景（Why）
//! - 统一维护常见桩对象，避免在各处重复定义等价结构体；
//! - 当核心契约演进时，通过单点更新保证所有测试同步适配。
//!
//! # 使用方式（How）
//! - 通过 `use spark_call::test_stubs::*;` 引入需要的桩类型；
//! - 所有桩对象在 `no_std + alloc` 环境同样可用。

pub mod recording;
pub mod transport;

pub use recording::{EventLog, LabelInterceptor, RecordingListener, RecordingSink, event_log};
pub use transport::{MockTransport, ReplyScript};
