// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::domain::models::checkpoint::CrawlCheckpoint;
use crate::domain::repositories::object_store::{ObjectStore, StorageError};

/// 检查点在对象存储中的键
pub const STATE_KEY: &str = "STATE";

/// 状态存储错误类型
#[derive(Error, Debug)]
pub enum StateError {
    /// 底层存储错误
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// 检查点序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 抓取状态存储
///
/// 维护全局去重集合和累计提取计数，并负责检查点的持久化。
/// 集合跨种子共享：同一房源出现在多个种子的结果里也只会
/// 被提取一次。所有方法都可以被多个工作器并发调用。
pub struct CrawlStateStore {
    /// 已提取的房源标识集合
    extracted: DashSet<String>,
    /// 累计提取计数
    total: AtomicU64,
    /// 检查点后端
    store: Arc<dyn ObjectStore + Send + Sync>,
}

impl CrawlStateStore {
    /// 创建状态存储
    pub fn new(store: Arc<dyn ObjectStore + Send + Sync>) -> Self {
        Self {
            extracted: DashSet::new(),
            total: AtomicU64::new(0),
            store,
        }
    }

    /// 判断房源是否已被提取过
    pub fn is_extracted(&self, zpid: &str) -> bool {
        self.extracted.contains(zpid)
    }

    /// 记录一批已提取的房源标识
    ///
    /// 返回本次真正新增的子集。并发调用时同一标识只会
    /// 被一个调用方计入新增。
    ///
    /// # 参数
    ///
    /// * `zpids` - 本批提取的房源标识
    ///
    /// # 返回值
    ///
    /// 此前未出现过的房源标识
    pub fn record_batch<I>(&self, zpids: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut added = Vec::new();
        for zpid in zpids {
            if self.extracted.insert(zpid.clone()) {
                added.push(zpid);
            }
        }
        self.total.fetch_add(added.len() as u64, Ordering::Relaxed);
        added
    }

    /// 释放一批已记录但未能输出的房源标识
    ///
    /// 输出失败时把 `record_batch` 占下的标识退回集合，
    /// 使重放能重新获取这些房源。只统计真正移除的数量。
    pub fn release_batch<'a, I>(&self, zpids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut removed = 0u64;
        for zpid in zpids {
            if self.extracted.remove(zpid).is_some() {
                removed += 1;
            }
        }
        self.total.fetch_sub(removed, Ordering::Relaxed);
    }

    /// 累计提取数量，包含从检查点恢复的部分
    pub fn total_extracted(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// 去重集合大小
    pub fn len(&self) -> usize {
        self.extracted.len()
    }

    /// 去重集合是否为空
    pub fn is_empty(&self) -> bool {
        self.extracted.is_empty()
    }

    /// 持久化检查点
    ///
    /// 把当前去重集合和计数写入对象存储。检查点在每个
    /// 详情分块落盘后刷新，崩溃后最多丢失一个分块的进度。
    pub async fn flush(&self) -> Result<(), StateError> {
        let checkpoint = CrawlCheckpoint {
            extracted_zpids: self.extracted.iter().map(|entry| entry.key().clone()).collect(),
            total_extracted: self.total.load(Ordering::Relaxed),
        };
        let payload = serde_json::to_vec(&checkpoint)?;
        self.store.save(STATE_KEY, &payload).await?;
        debug!(zpids = checkpoint.extracted_zpids.len(), "Checkpoint flushed");
        Ok(())
    }

    /// 从检查点恢复
    ///
    /// 把存储中的检查点并入当前集合。重启后先恢复再开始
    /// 抓取，使已提取的房源不会被重复输出。
    ///
    /// # 返回值
    ///
    /// 从检查点并入的房源标识数量，没有检查点时为0
    pub async fn restore(&self) -> Result<usize, StateError> {
        let Some(payload) = self.store.get(STATE_KEY).await? else {
            return Ok(0);
        };
        let checkpoint: CrawlCheckpoint = serde_json::from_slice(&payload)?;
        let restored = checkpoint.extracted_zpids.len();
        for zpid in checkpoint.extracted_zpids {
            self.extracted.insert(zpid);
        }
        // 计数与并集对齐，避免恢复与并发提取叠加时重复累计
        self.total
            .store(self.extracted.len() as u64, Ordering::Relaxed);
        Ok(restored)
    }
}
