// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 该模块包含系统的技术实现细节，提供对具体技术的抽象和封装。
/// 基础设施层负责与外部系统的交互，包括对象存储和监控系统。
///
/// 包含的子模块：
/// - 批量导出（export）：按种子分组的记录导出
/// - 指标（metrics）：提供系统监控和性能指标收集
/// - 记录输出（sink）：数据集记录的落盘实现
/// - 状态存储（state_store）：去重集合与检查点管理
/// - 存储（storage）：提供文件和对象存储功能
///
/// 基础设施层遵循依赖倒置原则，依赖于领域层的抽象接口，
/// 确保领域层保持纯粹的业务逻辑，不受技术实现的影响。
pub mod export;
pub mod metrics;
pub mod sink;
pub mod state_store;
pub mod storage;
