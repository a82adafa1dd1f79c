//! 记录存储 - 业务能力层
//!
//! 核心对存储只有一个要求：`save` 按自然标识幂等 upsert。
//! 至少一次投递意味着同一目标可能被成功抓取两次，第二次落库
//! 必须覆盖而不是追加。持久化引擎留在 trait 之后。

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::record::CrawlRecord;

/// 记录仓库
#[async_trait]
pub trait Repository: Send + Sync {
    /// 幂等 upsert：同一 `natural_id` 只保留一条（后写覆盖）
    async fn save(&self, record: CrawlRecord) -> Result<()>;

    /// 按自然标识读取
    async fn get(&self, natural_id: &str) -> Option<CrawlRecord>;

    /// 当前记录总数
    async fn count(&self) -> usize;
}

/// 进程内存实现
pub struct MemoryRepository {
    records: RwLock<HashMap<String, CrawlRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn save(&self, record: CrawlRecord) -> Result<()> {
        let mut records = self.records.write().await;
        let replaced = records
            .insert(record.natural_id.clone(), record)
            .is_some();
        if replaced {
            debug!("记录已存在，覆盖写入");
        }
        Ok(())
    }

    async fn get(&self, natural_id: &str) -> Option<CrawlRecord> {
        self.records.read().await.get(natural_id).cloned()
    }

    async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::RecordKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_is_idempotent_upsert() {
        let repo = MemoryRepository::new();

        let first = CrawlRecord::new(
            "pin:42",
            RecordKind::Pin,
            "https://www.pinterest.com/sangi/interior/",
            json!({ "image_url": "https://i.pinimg.com/a.jpg" }),
        );
        let second = CrawlRecord::new(
            "pin:42",
            RecordKind::Pin,
            "https://www.pinterest.com/search/pins/?q=interior",
            json!({ "image_url": "https://i.pinimg.com/b.jpg" }),
        );

        repo.save(first).await.unwrap();
        repo.save(second).await.unwrap();

        // 同一自然标识只有一条记录，内容是后写的
        assert_eq!(repo.count().await, 1);
        let stored = repo.get("pin:42").await.unwrap();
        assert_eq!(
            stored.payload["image_url"].as_str(),
            Some("https://i.pinimg.com/b.jpg")
        );
    }

    #[tokio::test]
    async fn test_distinct_ids_accumulate() {
        let repo = MemoryRepository::new();
        for i in 0..5 {
            repo.save(CrawlRecord::new(
                format!("pin:{}", i),
                RecordKind::Pin,
                "https://www.pinterest.com/",
                json!({}),
            ))
            .await
            .unwrap();
        }
        assert_eq!(repo.count().await, 5);
        assert!(repo.get("pin:3").await.is_some());
        assert!(repo.get("pin:9").await.is_none());
    }
}
