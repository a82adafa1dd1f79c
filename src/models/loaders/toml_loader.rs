//! 从 TOML 文件加载种子任务
//!
//! 种子文件格式：
//!
//! ```toml
//! [[task]]
//! id = "board-sangi-interior"
//! url = "https://www.pinterest.com/sangi/interior/"
//! kind = "board"
//! priority = "high"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;

use crate::models::resource::{AccountCredential, ProxyEndpoint};
use crate::models::task::NewTask;

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default, rename = "task")]
    tasks: Vec<NewTask>,
}

#[derive(Debug, Deserialize)]
struct ProxyFile {
    #[serde(default, rename = "proxy")]
    proxies: Vec<ProxyEndpoint>,
}

#[derive(Debug, Deserialize)]
struct AccountFile {
    #[serde(default, rename = "account")]
    accounts: Vec<AccountCredential>,
}

/// 从单个 TOML 文件加载种子任务
pub async fn load_seed_tasks(path: &Path) -> Result<Vec<NewTask>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取种子文件: {}", path.display()))?;

    let seed: SeedFile = toml::from_str(&content)
        .with_context(|| format!("无法解析种子文件: {}", path.display()))?;

    Ok(seed.tasks)
}

/// 从文件夹中加载所有 TOML 种子文件
pub async fn load_all_seed_files(folder_path: &str) -> Result<Vec<NewTask>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("种子文件夹不存在: {}", folder_path);
    }

    let mut all_tasks = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            tracing::info!(
                "正在加载: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );

            match load_seed_tasks(&path).await {
                Ok(tasks) => {
                    tracing::info!("成功加载 {} 个任务", tasks.len());
                    all_tasks.extend(tasks);
                }
                Err(e) => {
                    tracing::warn!("加载文件失败 {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(all_tasks)
}

/// 从 TOML 文件加载代理清单
pub async fn load_proxies(path: &Path) -> Result<Vec<ProxyEndpoint>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取代理清单: {}", path.display()))?;
    let file: ProxyFile = toml::from_str(&content)
        .with_context(|| format!("无法解析代理清单: {}", path.display()))?;
    Ok(file.proxies)
}

/// 从 TOML 文件加载账号清单
pub async fn load_accounts(path: &Path) -> Result<Vec<AccountCredential>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取账号清单: {}", path.display()))?;
    let file: AccountFile = toml::from_str(&content)
        .with_context(|| format!("无法解析账号清单: {}", path.display()))?;
    Ok(file.accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{Priority, TaskKind};

    #[test]
    fn test_parse_seed_file() {
        let content = r#"
            [[task]]
            id = "search-magenta"
            url = "https://www.pinterest.com/search/pins/?q=magenta"
            kind = "search"
            priority = "high"

            [[task]]
            id = "board-interior"
            url = "https://www.pinterest.com/sangi/interior/"
            kind = "board"
        "#;

        let seed: SeedFile = toml::from_str(content).unwrap();
        assert_eq!(seed.tasks.len(), 2);
        assert_eq!(seed.tasks[0].kind, TaskKind::Search);
        assert_eq!(seed.tasks[0].priority, Priority::High);
        // 未写优先级时默认 normal
        assert_eq!(seed.tasks[1].priority, Priority::Normal);
    }
}
