//! 提取服务 - 业务能力层
//!
//! 只负责"从当前页面提出记录"的能力，不关心会话流程。
//! 提取脚本在页面里跑，核心只拿回 JSON；字段规则按任务类型分派。

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::error::ExtractError;
use crate::infrastructure::browser::{BrowserBackend, ContextHandle};
use crate::models::record::{CrawlRecord, RecordKind};
use crate::models::task::{Task, TaskKind};

/// 提取器
#[async_trait]
pub trait Extractor: Send + Sync {
    /// 从上下文当前页面提取记录
    async fn extract(
        &self,
        browser: &dyn BrowserBackend,
        ctx: &ContextHandle,
        task: &Task,
    ) -> Result<Vec<CrawlRecord>, ExtractError>;
}

/// 基于页面脚本的提取器
pub struct PageExtractor {
    pin_id_re: Regex,
}

impl PageExtractor {
    pub fn new() -> Self {
        Self {
            pin_id_re: Regex::new(r"/pin/(\d+)").unwrap(),
        }
    }

    fn collection_script(kind: TaskKind) -> &'static str {
        match kind {
            // 搜索页与画板页：收集可见的 pin 卡片
            TaskKind::Search | TaskKind::Board => {
                r#"
                (() => {
                    const items = [];
                    document.querySelectorAll('a[href*="/pin/"]').forEach(a => {
                        const img = a.querySelector('img');
                        items.push({
                            href: a.getAttribute('href'),
                            image_url: img ? (img.src || img.getAttribute('data-src')) : null,
                            alt: img ? img.alt : null
                        });
                    });
                    return items;
                })()
                "#
            }
            // 详情页：单条记录
            TaskKind::Pin => {
                r#"
                (() => {
                    const img = document.querySelector('img[src*="pinimg"], main img');
                    const title = document.querySelector('h1');
                    return [{
                        href: window.location.pathname,
                        image_url: img ? img.src : null,
                        alt: title ? title.innerText : (img ? img.alt : null)
                    }];
                })()
                "#
            }
        }
    }

    fn natural_id(&self, href: &str) -> Option<String> {
        self.pin_id_re
            .captures(href)
            .and_then(|c| c.get(1))
            .map(|m| format!("pin:{}", m.as_str()))
    }
}

impl Default for PageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for PageExtractor {
    async fn extract(
        &self,
        browser: &dyn BrowserBackend,
        ctx: &ContextHandle,
        task: &Task,
    ) -> Result<Vec<CrawlRecord>, ExtractError> {
        let raw = browser
            .eval(ctx, Self::collection_script(task.kind).to_string())
            .await
            .map_err(|e| ExtractError::ParseFailed {
                source: Box::new(e),
            })?;

        let items = raw.as_array().ok_or_else(|| ExtractError::StructureMismatch {
            reason: "提取脚本未返回数组".to_string(),
        })?;

        let mut records = Vec::new();
        for item in items {
            let href = match item["href"].as_str() {
                Some(h) => h,
                None => continue,
            };
            let Some(natural_id) = self.natural_id(href) else {
                continue;
            };
            records.push(CrawlRecord::new(
                natural_id,
                RecordKind::Pin,
                task.url.clone(),
                json!({
                    "href": href,
                    "image_url": item["image_url"],
                    "alt": item["alt"],
                }),
            ));
        }

        if records.is_empty() {
            return Err(ExtractError::StructureMismatch {
                reason: format!("页面上没有可提取的记录 ({})", task.url),
            });
        }

        debug!("从 {} 提取到 {} 条记录", task.url, records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_id_from_href() {
        let extractor = PageExtractor::new();
        assert_eq!(
            extractor.natural_id("/pin/1234567890/"),
            Some("pin:1234567890".to_string())
        );
        assert_eq!(
            extractor.natural_id("https://www.pinterest.com/pin/42/?mt=login"),
            Some("pin:42".to_string())
        );
        assert_eq!(extractor.natural_id("/sangi/interior/"), None);
    }

    #[test]
    fn test_collection_script_varies_by_kind() {
        let board = PageExtractor::collection_script(TaskKind::Board);
        let pin = PageExtractor::collection_script(TaskKind::Pin);
        assert!(board.contains("querySelectorAll"));
        assert!(pin.contains("location.pathname"));
        assert_ne!(board, pin);
    }
}
