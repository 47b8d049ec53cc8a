// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 退避策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// 每次重试等待相同时间
    Fixed,
    /// 第 n 次重试等待 initial_backoff * n
    #[default]
    Linear,
    /// 第 n 次重试等待 initial_backoff * multiplier^(n-1)
    Exponential,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackoffStrategy::Fixed => write!(f, "fixed"),
            BackoffStrategy::Linear => write!(f, "linear"),
            BackoffStrategy::Exponential => write!(f, "exponential"),
        }
    }
}

/// 指数退避的默认乘数
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// 重试策略配置
///
/// `max_retries = N` 表示首次执行之外最多再重试 N 次，即最多执行 N + 1 次。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数（仅指数退避使用）
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)，为 0 时不加抖动
    pub jitter_factor: f64,
    /// 退避策略
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration, strategy: BackoffStrategy) -> Self {
        Self {
            max_retries,
            initial_backoff: retry_delay,
            max_backoff: Duration::MAX,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_factor: 0.0,
            strategy,
        }
    }

    /// 线性退避策略，不带抖动
    pub fn linear(max_retries: u32, retry_delay: Duration) -> Self {
        Self::new(max_retries, retry_delay, BackoffStrategy::Linear)
    }

    /// 设置抖动因子，超出 0.0-1.0 的值会被截断
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// 计算第 `attempt` 次重试（从 1 开始）之前的退避时间
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.initial_backoff.as_secs_f64();

        let backoff_secs = match self.strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base * attempt as f64,
            BackoffStrategy::Exponential => {
                base * self.backoff_multiplier.powi(attempt as i32 - 1)
            }
        };

        // 限制最大退避时间
        let capped_backoff = backoff_secs.min(self.max_backoff.as_secs_f64());

        let jitter_range = capped_backoff * self.jitter_factor;
        let final_backoff = if jitter_range > 0.0 {
            let jitter = rand::random_range(-jitter_range..jitter_range);
            (capped_backoff + jitter).max(0.0)
        } else {
            capped_backoff
        };

        Duration::try_from_secs_f64(final_backoff).unwrap_or(self.max_backoff)
    }

    /// 已经重试 `retries_done` 次后是否还能再重试
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}
