// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tracing::debug;

use crate::domain::models::listing::HomeRecord;
use crate::domain::models::seed::Seed;
use crate::domain::repositories::object_store::ObjectStore;
use crate::domain::repositories::record_sink::SinkError;

/// 批量导出器
///
/// 在主数据集之外把每条记录按种子分组写到独立的存储后端，
/// 键形如 `los+angeles-ca/12345.json`。供下游按区域批量
/// 取数使用，默认关闭。
pub struct BulkExporter {
    store: Arc<dyn ObjectStore + Send + Sync>,
}

impl BulkExporter {
    /// 创建批量导出器
    pub fn new(store: Arc<dyn ObjectStore + Send + Sync>) -> Self {
        Self { store }
    }

    /// 导出一条记录
    ///
    /// # 参数
    ///
    /// * `seed` - 记录来源的种子
    /// * `record` - 要导出的记录
    pub async fn export(&self, seed: &Seed, record: &HomeRecord) -> Result<(), SinkError> {
        let key = format!("{}/{}.json", seed.slug(), record.zpid);
        let payload = serde_json::to_vec(record)?;
        self.store.save(&key, &payload).await?;
        debug!(key = %key, "Record exported");
        Ok(())
    }
}
