// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 抓取流水线模块
///
/// 该模块实现抓取流程的各个阶段：
/// - 人机验证守卫（captcha）：挑战页检测
/// - 查询状态提取（extractor）：从入口页取初始查询状态
/// - 搜索（search）：调用搜索API获取候选房源
/// - 参数发现（discovery）：从真实流量习得详情API的查询参数
/// - 详情（detail）：逐个拉取房源详情并投影成输出记录
///
/// 各阶段只依赖页面会话抽象，不关心任务调度和持久化，
/// 由工作器按固定顺序把它们组合成完整流水线。
pub mod captcha;
pub mod detail;
pub mod discovery;
pub mod extractor;
pub mod search;
