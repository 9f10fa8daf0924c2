// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::task::CrawlTask;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 队列为空
    #[error("Queue empty")]
    Empty,

    /// 队列错误
    #[error("Queue error: {0}")]
    Other(String),
}

/// 任务队列特质
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 入队任务
    async fn enqueue(&self, task: CrawlTask) -> Result<CrawlTask, QueueError>;

    /// 出队任务
    async fn dequeue(&self, worker_id: Uuid) -> Result<Option<CrawlTask>, QueueError>;

    /// 完成任务
    async fn complete(&self, task_id: Uuid) -> Result<(), QueueError>;
    /// 失败任务
    async fn fail(&self, task_id: Uuid) -> Result<(), QueueError>;
}

/// 内存任务队列实现
///
/// 单进程运行的任务队列。退避重试的任务带计划时间重新入队，
/// 出队时跳过未到期的任务，保持到期任务的先进先出顺序。
pub struct InMemoryTaskQueue {
    /// 等待执行的任务
    tasks: Mutex<VecDeque<CrawlTask>>,
    /// 已完成任务计数
    completed: AtomicU64,
    /// 终态失败任务计数
    failed: AtomicU64,
}

/// 队列统计信息
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    /// 已完成任务数
    pub completed: u64,
    /// 终态失败任务数
    pub failed: u64,
}

impl InMemoryTaskQueue {
    /// 创建新的内存任务队列实例
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// 队列中等待的任务数，包含未到期的重试任务
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// 队列是否为空
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// 读取完成与失败计数
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    /// 入队任务
    ///
    /// # 参数
    ///
    /// * `task` - 要入队的任务
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlTask)` - 入队成功的任务
    /// * `Err(QueueError)` - 入队失败
    async fn enqueue(&self, task: CrawlTask) -> Result<CrawlTask, QueueError> {
        debug!(task_id = %task.id, seed = %task.seed, "Task enqueued");
        self.tasks.lock().push_back(task.clone());
        Ok(task)
    }

    /// 出队任务
    ///
    /// 按先进先出顺序取出第一个到期的任务，未到期的
    /// 重试任务原位保留
    ///
    /// # 参数
    ///
    /// * `worker_id` - 工作者ID
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(CrawlTask))` - 成功出队的任务
    /// * `Ok(None)` - 没有可出队的任务
    /// * `Err(QueueError)` - 出队失败
    async fn dequeue(&self, worker_id: Uuid) -> Result<Option<CrawlTask>, QueueError> {
        let now = Utc::now();
        let mut tasks = self.tasks.lock();
        let due = tasks.iter().position(|task| task.is_due(now));
        let task = due.and_then(|index| tasks.remove(index));
        if let Some(task) = &task {
            debug!(task_id = %task.id, worker_id = %worker_id, "Task dequeued");
        }
        Ok(task)
    }

    async fn complete(&self, task_id: Uuid) -> Result<(), QueueError> {
        self.completed.fetch_add(1, Ordering::Relaxed);
        debug!(task_id = %task_id, "Task completed");
        Ok(())
    }

    async fn fail(&self, task_id: Uuid) -> Result<(), QueueError> {
        self.failed.fetch_add(1, Ordering::Relaxed);
        debug!(task_id = %task_id, "Task failed");
        Ok(())
    }
}

#[async_trait]
impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    async fn enqueue(&self, task: CrawlTask) -> Result<CrawlTask, QueueError> {
        (**self).enqueue(task).await
    }

    async fn dequeue(&self, worker_id: Uuid) -> Result<Option<CrawlTask>, QueueError> {
        (**self).dequeue(worker_id).await
    }

    async fn complete(&self, task_id: Uuid) -> Result<(), QueueError> {
        (**self).complete(task_id).await
    }

    async fn fail(&self, task_id: Uuid) -> Result<(), QueueError> {
        (**self).fail(task_id).await
    }
}
