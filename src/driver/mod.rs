// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 浏览器驱动模块
///
/// 该模块提供页面驱动抽象及其Chromium实现：
/// - 驱动特质（traits）：页面会话的抽象接口
/// - Chromium驱动（chromium）：基于CDP协议的具体实现
///
/// 流水线各阶段只依赖抽象接口，测试中可以用脚本化的
/// 模拟会话替换真实浏览器。
pub mod chromium;
pub mod traits;
