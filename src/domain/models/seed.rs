// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

static COMMA_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*").expect("comma pattern"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// 种子输入
///
/// 一次运行的起点，可以是搜索词（如 "Los Angeles, CA"）或邮编。
/// 种子创建后不可变，每个种子对应一个初始任务。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seed {
    /// 搜索词种子
    SearchTerm(String),
    /// 邮编种子
    ZipCode(String),
}

impl Seed {
    /// 生成门户 URL 路径片段
    ///
    /// 规则：去首尾空白，逗号及其后空白替换为 `-`，
    /// 空白串替换为 `+`，整体转小写。邮编不受影响。
    pub fn slug(&self) -> String {
        let raw = match self {
            Seed::SearchTerm(term) => term,
            Seed::ZipCode(zip) => zip,
        };
        let trimmed = raw.trim();
        let dashed = COMMA_RUN.replace_all(trimmed, "-");
        let plussed = WHITESPACE_RUN.replace_all(&dashed, "+");
        plussed.to_lowercase()
    }

    /// 构建种子的起始页 URL
    ///
    /// # 参数
    ///
    /// * `base_url` - 门户站点根地址
    ///
    /// # 返回值
    ///
    /// * `Ok(String)` - 形如 `{base}/homes/{slug}` 的起始页地址
    /// * `Err(url::ParseError)` - 根地址不合法
    pub fn start_url(&self, base_url: &str) -> Result<String, url::ParseError> {
        let base = Url::parse(base_url)?;
        let joined = base.join(&format!("/homes/{}", self.slug()))?;
        Ok(joined.to_string())
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Seed::SearchTerm(term) => write!(f, "{}", term),
            Seed::ZipCode(zip) => write!(f, "{}", zip),
        }
    }
}
