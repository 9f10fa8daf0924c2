// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 端到端测试模块
///
/// 模拟真实用户场景，测试整个系统的完整工作流程
/// 验证各个组件之间的集成和整体业务功能
pub mod full_run_test;
