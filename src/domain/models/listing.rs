// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 搜索结果中的房源引用
///
/// 搜索响应里的轻量条目，只保证携带房源标识；
/// 缺失标识的条目在构造阶段就被丢弃。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRef {
    /// 房源标识
    pub zpid: String,
    /// 搜索结果原始条目
    pub raw: Value,
}

impl ListingRef {
    /// 从搜索结果条目提取房源引用
    ///
    /// 门户在不同版本的响应中把 zpid 写成字符串或数字，两种都接受；
    /// 缺失或为空的条目返回 None
    pub fn from_result(value: &Value) -> Option<Self> {
        let zpid = match value.get("zpid") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return None,
        };
        Some(Self {
            zpid,
            raw: value.clone(),
        })
    }
}

/// 房源详情记录
///
/// 输出数据的固定模式。除 zpid 外所有字段都是可选的，
/// 详情响应中缺失的字段直接省略，不视为错误。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeRecord {
    /// 房源标识
    pub zpid: String,
    /// 地址信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Value>,
    /// 卧室数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<f64>,
    /// 浴室数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<f64>,
    /// 价格
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// 建成年份
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i64>,
    /// 经度
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// 纬度
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// 房源描述
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 居住面积
    #[serde(skip_serializing_if = "Option::is_none")]
    pub living_area: Option<f64>,
    /// 币种
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// 房屋类型
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_type: Option<String>,
    /// 时区
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    /// 估价
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zestimate: Option<f64>,
    /// 房屋概况
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_facts: Option<Value>,
    /// 税务评估价值
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_assessed_value: Option<f64>,
    /// 税务评估年份
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_assessed_year: Option<i64>,
    /// 地块面积
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_size: Option<f64>,
    /// 发布时间（epoch 毫秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_posted: Option<i64>,
}

impl HomeRecord {
    /// 从详情响应的 property 对象投影出记录
    ///
    /// 按固定白名单挑选字段，缺失的字段保持 None
    ///
    /// # 参数
    ///
    /// * `zpid` - 房源标识
    /// * `property` - 详情响应中的 `data.property` 对象
    pub fn from_property(zpid: impl Into<String>, property: &Value) -> Self {
        Self {
            zpid: zpid.into(),
            address: property.get("address").filter(|v| !v.is_null()).cloned(),
            bedrooms: get_f64(property, "bedrooms"),
            bathrooms: get_f64(property, "bathrooms"),
            price: get_f64(property, "price"),
            year_built: get_i64(property, "yearBuilt"),
            longitude: get_f64(property, "longitude"),
            latitude: get_f64(property, "latitude"),
            description: get_string(property, "description"),
            living_area: get_f64(property, "livingArea"),
            currency: get_string(property, "currency"),
            home_type: get_string(property, "homeType"),
            time_zone: get_string(property, "timeZone"),
            zestimate: get_f64(property, "zestimate"),
            home_facts: property.get("homeFacts").filter(|v| !v.is_null()).cloned(),
            tax_assessed_value: get_f64(property, "taxAssessedValue"),
            tax_assessed_year: get_i64(property, "taxAssessedYear"),
            lot_size: get_f64(property, "lotSize"),
            date_posted: property.get("datePosted").and_then(parse_date_posted),
        }
    }
}

fn get_f64(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

fn get_i64(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(Value::as_i64)
}

fn get_string(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

/// 解析发布时间为 epoch 毫秒
///
/// 门户给出的 datePosted 可能是数字时间戳、RFC 3339
/// 时间戳或 `YYYY-MM-DD` 日期串
fn parse_date_posted(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.timestamp_millis());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp_millis())
        }
        _ => None,
    }
}
