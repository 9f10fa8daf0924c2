// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 抓取进度检查点
///
/// 持久化到对象存储的去重状态快照。重启后加载快照即可
/// 跳过已提取过的房源，使运行满足幂等性。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlCheckpoint {
    /// 已提取的房源标识集合
    #[serde(default)]
    pub extracted_zpids: Vec<String>,
    /// 累计提取数量
    #[serde(default)]
    pub total_extracted: u64,
}
