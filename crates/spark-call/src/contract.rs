//! 调用层公共契约原语：取消、截止与状态机接口。
//!
//! # 设计背景（Why）
//! - 调用管线中的每一次远程调用都必须可被外部打断、可被截止时间约束，
//!   并且其生命周期可以被形式化的状态机描述；
//! - 这些原语不依赖具体传输或运行时，保证 `no_std + alloc` 环境同样可用。

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

/// 单调时钟上的时间点，以“自进程基准起的偏移”表示。
///
/// # 设计背景（Why）
/// - `no_std` 环境无法依赖 `std::time::Instant`，因此以 [`Duration`] 偏移量表达
///   单调时间点，由宿主（运行时或传输层）提供统一的计时源。
///
/// # 契约说明（What）
/// - 比较运算仅在同一计时源产生的时间点之间有意义；
/// - 所有算术均为饱和语义，不会 panic。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicTimePoint(Duration);

impl MonotonicTimePoint {
    /// 以偏移量构造时间点。
    pub const fn from_offset(offset: Duration) -> Self {
        Self(offset)
    }

    /// 返回自基准起的偏移。
    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    /// 饱和加法，越界时停在 `Duration::MAX`。
    pub fn saturating_add(self, delta: Duration) -> Self {
        Self(self.0.saturating_add(delta))
    }

    /// 计算相对更早时间点的间隔；若 `earlier` 在当前之后则返回零。
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

/// 取消原语，统一表达调用的可中断性契约。
///
/// # 设计背景（Why）
/// - 调用可能在任意阶段被调用方放弃，拦截器与传输层都需要观测同一份取消状态；
/// - `no_std` 下缺乏统一的任务取消接口，因此以轻量的原子位提供最小可行解。
///
/// # 逻辑解析（How）
/// - 内部使用 [`AtomicBool`] 表达取消状态，并通过 [`Arc`] 支持多方共享；
/// - `cancel` 在首次成功设置取消位时返回 `true`，后续重复调用返回 `false`，
///   供调用方区分“首次触发”与“重复请求”；
/// - `child` 生成共享同一原子位的派生实例，便于跨拦截器传播取消信号。
///
/// # 契约说明（What）
/// - **前置条件**：构造时默认处于“未取消”状态；
/// - **后置条件**：一旦 `cancel` 成功，`is_cancelled` 对所有持有者全局可见。
///
/// # 风险提示（Trade-offs）
/// - 未提供回调注册接口；需要通知机制的组件应在事件循环内轮询取消位。
#[derive(Clone, Debug)]
pub struct Cancellation {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    flag: AtomicBool,
}

impl Cancellation {
    /// 创建处于“未取消”状态的取消令牌。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationState {
                flag: AtomicBool::new(false),
            }),
        }
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// 将当前令牌标记为取消。
    ///
    /// 返回 `true` 表示本次调用首次触发取消；`false` 表示之前已被取消。
    pub fn cancel(&self) -> bool {
        self.inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 派生共享同一原子位的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// 截止原语，描述调用的最迟完成时间。
///
/// # 契约说明（What）
/// - `Deadline` 可以为空（未设置），代表调用方未施加硬超时限制；
/// - `with_timeout` 以当前时间点加持续时间生成截止点，`now` 必须来自同一计时源；
/// - `is_expired` 基于调用时提供的当前时间判断，不依赖壁钟。
///
/// # 风险提示（Trade-offs）
/// - 截止时间不会自动驱动取消：管线仅随调用描述符传播截止信息，到期检测与
///   [`Cancellation::cancel`] 的触发由持有计时器的协作方（通常是传输层）负责。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    instant: Option<MonotonicTimePoint>,
}

impl Deadline {
    /// 创建未设置截止时间的实例。
    pub const fn none() -> Self {
        Self { instant: None }
    }

    /// 根据绝对时间点构造截止时间。
    pub fn at(instant: MonotonicTimePoint) -> Self {
        Self {
            instant: Some(instant),
        }
    }

    /// 基于当前时间点加持续时间生成截止时间。
    pub fn with_timeout(now: MonotonicTimePoint, timeout: Duration) -> Self {
        Self::at(now.saturating_add(timeout))
    }

    /// 返回内部时间点，便于与自定义调度器协作。
    pub fn instant(&self) -> Option<MonotonicTimePoint> {
        self.instant
    }

    /// 判断是否已经超时。
    pub fn is_expired(&self, now: MonotonicTimePoint) -> bool {
        match self.instant {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::none()
    }
}

/// 状态推进结果，配合 [`ContractStateMachine`] 描述状态转换效果。
///
/// # 设计目标（Why）
/// - 让状态机实现者在返回值中明确指示“是否发生状态跃迁”，便于上层据此触发事件；
/// - 区分 `Noop` 与 `Transition`，避免上层重复记录或误判。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateAdvance<S>
where
    S: Copy + Eq,
{
    /// 状态未变化，通常表示收到重复信号或被动确认。
    Noop { state: S },
    /// 状态发生跃迁。
    Transition { from: S, to: S },
}

/// 最小状态机接口，约束调用生命周期等组件如何驱动内部状态。
///
/// # 契约说明（What）
/// - `State`：状态枚举，必须可比较且可复制，便于在日志与事件中使用；
/// - `Signal`：驱动状态的输入（如调用操作或入站事件）；
/// - `state()`：读取当前状态，应为无副作用操作；
/// - `on_signal(signal)`：根据输入信号推进状态，返回 [`StateAdvance`]；
/// - **并发约束**：接口本身不规定同步策略，调用方需根据实现文档决定是否加锁。
///
/// # 风险提示（Trade-offs）
/// - 返回 `Noop` 时务必保持状态未变，否则会破坏日志与事件的一致性。
pub trait ContractStateMachine {
    /// 状态枚举类型。
    type State: Copy + Eq;
    /// 驱动状态的信号。
    type Signal;

    /// 读取当前状态。
    fn state(&self) -> Self::State;

    /// 根据输入信号推进状态，并返回跃迁结果。
    fn on_signal(&mut self, signal: &Self::Signal) -> StateAdvance<Self::State>;
}
