// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 爬取流水线模块
///
/// 实现提取流水线的各个阶段：人机验证检查、查询状态提取、
/// 搜索、详情获取和查询参数发现
pub mod crawl;

/// 领域模块
///
/// 包含核心业务实体和仓库接口
pub mod domain;

/// 驱动模块
///
/// 封装页面渲染引擎，对外提供页面会话抽象
pub mod driver;

/// 基础设施模块
///
/// 提供外部服务集成，如存储、检查点、数据输出等
pub mod infrastructure;

/// 队列模块
///
/// 实现任务队列和调度功能
pub mod queue;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

/// 工作器模块
///
/// 实现后台任务处理和工作器管理
pub mod workers;
