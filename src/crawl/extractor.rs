// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::Value;

use crate::domain::models::query_state::QueryState;
use crate::driver::traits::PageSession;
use crate::utils::errors::StageError;

/// 读取页面内嵌数据块的脚本
///
/// 搜索入口页把初始查询状态嵌在一个带固定标识属性的
/// script 标签里，这里只取其文本，解码在进程侧完成
const EMBEDDED_BLOCK_SCRIPT: &str = r#"(() => {
    const el = document.querySelector('script[data-zrr-shared-data-key="mobileSearchPageStore"]');
    return el ? el.textContent : null;
})()"#;

/// 内嵌块的注释框架长度：前缀 `<!--` 与后缀 `-->`
const FRAME_PREFIX_LEN: usize = 4;
const FRAME_SUFFIX_LEN: usize = 3;

/// 查询状态提取器
///
/// 从已加载的搜索入口页提取初始查询状态。提取到的状态
/// 缓存在任务上，重试时直接复用而不再访问入口页。
pub struct QueryStateExtractor;

impl QueryStateExtractor {
    /// 从当前页面提取查询状态
    ///
    /// # 返回值
    ///
    /// * `Ok(QueryState)` - 提取到的查询状态
    /// * `Err(StageError::Extraction)` - 数据块缺失或无法解码
    pub async fn extract(&self, session: &dyn PageSession) -> Result<QueryState, StageError> {
        let raw = session.evaluate(EMBEDDED_BLOCK_SCRIPT).await?;
        let Some(text) = raw.as_str() else {
            return Err(StageError::Extraction(
                "embedded data block not found".to_string(),
            ));
        };
        parse_embedded_block(text)
    }
}

/// 解码内嵌数据块
///
/// 按固定长度剥掉注释框架后解析JSON并取其查询状态成员
fn parse_embedded_block(text: &str) -> Result<QueryState, StageError> {
    let total = FRAME_PREFIX_LEN + FRAME_SUFFIX_LEN;
    if text.len() < total
        || !text.is_char_boundary(FRAME_PREFIX_LEN)
        || !text.is_char_boundary(text.len() - FRAME_SUFFIX_LEN)
    {
        return Err(StageError::Extraction(
            "embedded data block has unexpected framing".to_string(),
        ));
    }

    let inner = &text[FRAME_PREFIX_LEN..text.len() - FRAME_SUFFIX_LEN];
    let value: Value = serde_json::from_str(inner)
        .map_err(|e| StageError::Extraction(format!("embedded data block is not valid JSON: {e}")))?;
    let query_state = value
        .get("queryState")
        .cloned()
        .ok_or_else(|| StageError::Extraction("embedded data block lacks queryState".to_string()))?;
    Ok(QueryState::new(query_state))
}
