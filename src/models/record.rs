//! 抓取记录模型
//!
//! 记录以自然标识（站点侧的 pin/board/user ID）为主键，
//! 存储层按该主键做幂等 upsert，重复投递不会产生重复记录。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 记录类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Pin,
    Board,
    User,
}

/// 一条抓取结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRecord {
    /// 站点侧的自然标识，存储层的 upsert 主键
    pub natural_id: String,
    pub kind: RecordKind,
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
    /// 字段内容由提取器决定，核心不感知具体 schema
    pub payload: JsonValue,
}

impl CrawlRecord {
    pub fn new(
        natural_id: impl Into<String>,
        kind: RecordKind,
        source_url: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        Self {
            natural_id: natural_id.into(),
            kind,
            source_url: source_url.into(),
            fetched_at: Utc::now(),
            payload,
        }
    }
}
