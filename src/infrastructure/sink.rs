// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::domain::models::listing::HomeRecord;
use crate::domain::repositories::object_store::ObjectStore;
use crate::domain::repositories::record_sink::{RecordSink, SinkError};

/// 数据集输出实现
///
/// 把每条记录写成对象存储中的一个顺序编号文件，
/// 形如 `dataset/000000042.json`。编号顺序即推送顺序。
pub struct DatasetSink {
    store: Arc<dyn ObjectStore + Send + Sync>,
    sequence: AtomicU64,
}

impl DatasetSink {
    /// 创建数据集输出
    pub fn new(store: Arc<dyn ObjectStore + Send + Sync>) -> Self {
        Self {
            store,
            sequence: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl RecordSink for DatasetSink {
    async fn push(&self, record: &HomeRecord) -> Result<(), SinkError> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let key = format!("dataset/{:09}.json", seq);
        let payload = serde_json::to_vec(record)?;
        self.store.save(&key, &payload).await?;
        debug!(zpid = %record.zpid, key = %key, "Record pushed");
        Ok(())
    }
}

/// 内存输出实现（用于测试）
pub struct MemorySink {
    records: Mutex<Vec<HomeRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// 取出已推送记录的快照
    pub fn records(&self) -> Vec<HomeRecord> {
        self.records.lock().clone()
    }

    /// 已推送记录数
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn push(&self, record: &HomeRecord) -> Result<(), SinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
