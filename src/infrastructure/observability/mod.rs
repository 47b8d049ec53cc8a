// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 可观测性模块
///
/// 提供指标描述、系统资源采样和资源监控
pub mod metrics;
pub mod resource_monitor;
