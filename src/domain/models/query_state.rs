// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 门户搜索查询状态
///
/// 包装从房源列表页提取的结构化过滤条件 JSON。提取后不再修改；
/// 搜索请求使用 [`QueryState::with_sold_filter`] 返回的增强副本。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryState(Value);

impl QueryState {
    /// 包装一段查询状态 JSON
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// 原始查询状态
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// 返回叠加了已售状态过滤条件的副本
    ///
    /// 在 `filterState` 中合并 `isRecentlySold = { value: true }`，
    /// 保留已有的过滤条件；原状态不受影响
    pub fn with_sold_filter(&self) -> QueryState {
        let mut state = self.0.clone();
        if let Some(obj) = state.as_object_mut() {
            let filter = obj.entry("filterState").or_insert_with(|| json!({}));
            if !filter.is_object() {
                *filter = json!({});
            }
            filter["isRecentlySold"] = json!({ "value": true });
        }
        Self(state)
    }
}
