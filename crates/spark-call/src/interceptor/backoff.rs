use core::time::Duration;

use libm::pow;

/// 重试等待窗口计算核心：按尝试次数指数放大基础等待时间，叠加确定性抖动，
/// 并以冷却下限与饱和上限夹紧。
///
/// # 教案式说明
/// - **意图（Why）**：失败的尝试若以固定间隔集体重试，会在同一时刻形成“惊群”，
///   进一步压垮已经不稳的后端。指数增长拉开批次间距，抖动打散同批调用方。
/// - **契约（What）**：
///   - `attempt`：即将发起的重试序号，首次重试为 1；
///   - `base`：策略配置的基础等待时间，为零时回退至默认冷却窗口；
///   - **返回**：落在 `[MIN_COOLDOWN, MAX_WAIT]` 区间内的建议等待时长。
/// - **后置条件**：抖动为确定性伪随机（SplitMix64），相同输入必得相同输出，
///   保证测试可重复；幅度控制在 ±5%。
/// - **权衡与注意事项（Trade-offs & Gotchas）**：
///   - 采用浮点运算换取平滑调节，已通过 `clamp` 避免溢出；
///     在 `no_std + alloc` 环境下同样可用；
///   - 核心不拥有计时器，返回值仅为建议：持有调度能力的宿主据此安排下一次
///     尝试，无计时器的宿主至少可将其写入事件备注供运维观测。
pub fn compute(attempt: u32, base: Duration) -> Duration {
    let cooled_base = if base < MIN_COOLDOWN {
        MIN_COOLDOWN
    } else {
        base
    };

    let exponent = if attempt == 0 { 0 } else { attempt - 1 };
    let growth = pow(GROWTH_FACTOR, exponent as f64);
    let mut wait_secs = cooled_base.as_secs_f64() * growth;

    let jitter_seed = mix64(u64::from(attempt) ^ fold_duration(cooled_base));
    wait_secs *= jitter_factor(jitter_seed);

    wait_secs = clamp_f64(wait_secs, cooled_base.as_secs_f64(), MAX_WAIT.as_secs_f64());
    Duration::from_secs_f64(wait_secs)
}

const MIN_COOLDOWN: Duration = Duration::from_millis(40);
const MAX_WAIT: Duration = Duration::from_secs(3);
const GROWTH_FACTOR: f64 = 2.0;
const JITTER_RANGE: f64 = 0.05;

#[inline]
fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

#[inline]
fn fold_duration(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();
    let upper = (nanos >> 64) as u64;
    let lower = nanos as u64;
    upper ^ lower
}

#[inline]
fn jitter_factor(seed: u64) -> f64 {
    let mixed = mix64(seed);
    let mantissa = (mixed >> 11) as f64;
    let unit = mantissa / ((1u64 << 53) as f64);
    1.0 + (unit * 2.0 - 1.0) * JITTER_RANGE
}

#[inline]
fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}
