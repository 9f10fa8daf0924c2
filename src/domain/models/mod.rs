// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 种子（seed）：一次运行的搜索词或邮编输入
/// - 查询状态（query_state）：门户搜索页携带的查询参数
/// - 任务（task）：一个种子对应的完整抓取流程
/// - 房源（listing）：搜索结果引用和详情记录
/// - 检查点（checkpoint）：持久化的去重进度快照
///
/// 这些模型构成了系统的数据基础，定义了业务概念的
/// 结构和行为，是领域驱动设计的核心组成部分。
pub mod checkpoint;
pub mod listing;
pub mod query_state;
pub mod seed;
pub mod task;
