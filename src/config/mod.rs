// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理器运行参数以及从文件和环境变量加载配置
pub mod processor_config;
pub mod settings;

pub use processor_config::{ProcessorConfig, ProcessorType, ResourceLimits};
pub use settings::Settings;
