// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 提供任务队列功能
/// 负责任务的排队、延迟重试和执行管理
pub mod task_queue;
