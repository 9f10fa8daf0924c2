// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::listing::HomeRecord;
use crate::domain::repositories::object_store::StorageError;

/// 输出错误类型
#[derive(Error, Debug)]
pub enum SinkError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 底层存储错误
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// 输出错误
    #[error("Sink error: {0}")]
    Other(String),
}

/// 记录输出特质
///
/// 定义房源记录的输出接口。每条通过去重的记录推送一次，
/// 推送顺序即持久化顺序。
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// 推送一条房源记录
    async fn push(&self, record: &HomeRecord) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: RecordSink + ?Sized> RecordSink for std::sync::Arc<T> {
    async fn push(&self, record: &HomeRecord) -> Result<(), SinkError> {
        (**self).push(record).await
    }
}
