//! 程序配置
//!
//! 所有运行参数集中在一个扁平结构上：先取默认值，再逐项被
//! 环境变量覆盖；也可以整体从 TOML 文件读入。

use serde::Deserialize;
use tokio::time::Duration;

use crate::pool::{PoolConfig, RotationStrategy};
use crate::queue::QueueConfig;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 并发与队列 ---
    /// 同时运行的会话数（worker 数量）
    pub max_concurrent_sessions: usize,
    /// 任务租约时长（秒）
    pub lease_duration_secs: u64,
    /// 最大重试次数
    pub max_retries: u32,
    /// 常规重试基准延迟（毫秒）
    pub base_retry_delay_ms: u64,
    /// 资源池耗尽时的重试基准延迟（毫秒）
    pub exhausted_retry_delay_ms: u64,
    /// 重试延迟上限（毫秒）
    pub retry_delay_cap_ms: u64,
    /// worker 单次出队等待（秒）
    pub dequeue_poll_secs: u64,
    // --- 限速 ---
    /// 全局每分钟请求数
    pub requests_per_minute: u32,
    /// 单域名每分钟请求数（0 表示不按域名限速）
    pub per_domain_rpm: u32,
    // --- 资源池 ---
    /// 代理池轮换策略
    pub proxy_strategy: String,
    /// 账号池轮换策略（默认 least_used，并列取最旧 last_used）
    pub account_strategy: String,
    /// 连续失败阈值
    pub failure_threshold: u32,
    /// 冷却基准时长（秒）
    pub cooldown_base_secs: u64,
    /// 冷却时长上限（秒）
    pub cooldown_cap_secs: u64,
    /// 池耗尽时是否阻塞等待
    pub pool_block_on_exhausted: bool,
    /// 阻塞等待上限（秒）
    pub pool_checkout_timeout_secs: u64,
    // --- 浏览器 ---
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 登录页 URL
    pub login_url: String,
    /// 指纹生成种子（0 表示随机）
    pub fingerprint_seed: u64,
    // --- 预热 ---
    /// 是否执行预热
    pub warmup_enabled: bool,
    /// 预热单步停顿下限（毫秒）
    pub warmup_dwell_min_ms: u64,
    /// 预热单步停顿上限（毫秒）
    pub warmup_dwell_max_ms: u64,
    // --- 各阶段超时（秒） ---
    pub acquire_timeout_secs: u64,
    pub prepare_timeout_secs: u64,
    pub warmup_timeout_secs: u64,
    pub auth_timeout_secs: u64,
    pub execute_timeout_secs: u64,
    pub teardown_timeout_secs: u64,
    // --- 验证码 ---
    /// 解决策略: auto_solve / manual / skip
    pub captcha_strategy: String,
    /// AutoSolve 对服务商的最大尝试次数
    pub captcha_max_solve_attempts: u32,
    /// Manual 策略等待上限（秒）
    pub captcha_manual_wait_secs: u64,
    pub solver_api_url: String,
    pub solver_api_key: String,
    // --- 文件 ---
    /// 种子任务 TOML 文件夹
    pub seed_task_folder: String,
    /// 代理清单（TOML）
    pub proxies_file: String,
    /// 账号清单（TOML）
    pub accounts_file: String,
    /// 永久失败任务的死信文件
    pub failed_tasks_file: String,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 4,
            lease_duration_secs: 120,
            max_retries: 3,
            base_retry_delay_ms: 5_000,
            exhausted_retry_delay_ms: 60_000,
            retry_delay_cap_ms: 900_000,
            dequeue_poll_secs: 5,
            requests_per_minute: 60,
            per_domain_rpm: 30,
            proxy_strategy: "round_robin".to_string(),
            account_strategy: "least_used".to_string(),
            failure_threshold: 3,
            cooldown_base_secs: 60,
            cooldown_cap_secs: 1800,
            pool_block_on_exhausted: false,
            pool_checkout_timeout_secs: 10,
            browser_debug_port: 9222,
            login_url: "https://www.pinterest.com/login/".to_string(),
            fingerprint_seed: 0,
            warmup_enabled: true,
            warmup_dwell_min_ms: 300,
            warmup_dwell_max_ms: 1500,
            acquire_timeout_secs: 15,
            prepare_timeout_secs: 30,
            warmup_timeout_secs: 20,
            auth_timeout_secs: 60,
            execute_timeout_secs: 90,
            teardown_timeout_secs: 15,
            captcha_strategy: "auto_solve".to_string(),
            captcha_max_solve_attempts: 3,
            captcha_manual_wait_secs: 120,
            solver_api_url: "http://solver.local:8080".to_string(),
            solver_api_key: String::new(),
            seed_task_folder: "seed_tasks".to_string(),
            proxies_file: "proxies.toml".to_string(),
            accounts_file: "accounts.toml".to_string(),
            failed_tasks_file: "failed_tasks.txt".to_string(),
            output_log_file: "output.txt".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_sessions: env_parse("MAX_CONCURRENT_SESSIONS", default.max_concurrent_sessions),
            lease_duration_secs: env_parse("LEASE_DURATION_SECS", default.lease_duration_secs),
            max_retries: env_parse("MAX_RETRIES", default.max_retries),
            base_retry_delay_ms: env_parse("BASE_RETRY_DELAY_MS", default.base_retry_delay_ms),
            exhausted_retry_delay_ms: env_parse("EXHAUSTED_RETRY_DELAY_MS", default.exhausted_retry_delay_ms),
            retry_delay_cap_ms: env_parse("RETRY_DELAY_CAP_MS", default.retry_delay_cap_ms),
            dequeue_poll_secs: env_parse("DEQUEUE_POLL_SECS", default.dequeue_poll_secs),
            requests_per_minute: env_parse("REQUESTS_PER_MINUTE", default.requests_per_minute),
            per_domain_rpm: env_parse("PER_DOMAIN_RPM", default.per_domain_rpm),
            proxy_strategy: std::env::var("PROXY_STRATEGY").unwrap_or(default.proxy_strategy),
            account_strategy: std::env::var("ACCOUNT_STRATEGY").unwrap_or(default.account_strategy),
            failure_threshold: env_parse("FAILURE_THRESHOLD", default.failure_threshold),
            cooldown_base_secs: env_parse("COOLDOWN_BASE_SECS", default.cooldown_base_secs),
            cooldown_cap_secs: env_parse("COOLDOWN_CAP_SECS", default.cooldown_cap_secs),
            pool_block_on_exhausted: env_parse("POOL_BLOCK_ON_EXHAUSTED", default.pool_block_on_exhausted),
            pool_checkout_timeout_secs: env_parse("POOL_CHECKOUT_TIMEOUT_SECS", default.pool_checkout_timeout_secs),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", default.browser_debug_port),
            login_url: std::env::var("LOGIN_URL").unwrap_or(default.login_url),
            fingerprint_seed: env_parse("FINGERPRINT_SEED", default.fingerprint_seed),
            warmup_enabled: env_parse("WARMUP_ENABLED", default.warmup_enabled),
            warmup_dwell_min_ms: env_parse("WARMUP_DWELL_MIN_MS", default.warmup_dwell_min_ms),
            warmup_dwell_max_ms: env_parse("WARMUP_DWELL_MAX_MS", default.warmup_dwell_max_ms),
            acquire_timeout_secs: env_parse("ACQUIRE_TIMEOUT_SECS", default.acquire_timeout_secs),
            prepare_timeout_secs: env_parse("PREPARE_TIMEOUT_SECS", default.prepare_timeout_secs),
            warmup_timeout_secs: env_parse("WARMUP_TIMEOUT_SECS", default.warmup_timeout_secs),
            auth_timeout_secs: env_parse("AUTH_TIMEOUT_SECS", default.auth_timeout_secs),
            execute_timeout_secs: env_parse("EXECUTE_TIMEOUT_SECS", default.execute_timeout_secs),
            teardown_timeout_secs: env_parse("TEARDOWN_TIMEOUT_SECS", default.teardown_timeout_secs),
            captcha_strategy: std::env::var("CAPTCHA_STRATEGY").unwrap_or(default.captcha_strategy),
            captcha_max_solve_attempts: env_parse("CAPTCHA_MAX_SOLVE_ATTEMPTS", default.captcha_max_solve_attempts),
            captcha_manual_wait_secs: env_parse("CAPTCHA_MANUAL_WAIT_SECS", default.captcha_manual_wait_secs),
            solver_api_url: std::env::var("SOLVER_API_URL").unwrap_or(default.solver_api_url),
            solver_api_key: std::env::var("SOLVER_API_KEY").unwrap_or(default.solver_api_key),
            seed_task_folder: std::env::var("SEED_TASK_FOLDER").unwrap_or(default.seed_task_folder),
            proxies_file: std::env::var("PROXIES_FILE").unwrap_or(default.proxies_file),
            accounts_file: std::env::var("ACCOUNTS_FILE").unwrap_or(default.accounts_file),
            failed_tasks_file: std::env::var("FAILED_TASKS_FILE").unwrap_or(default.failed_tasks_file),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        }
    }

    /// 从 TOML 文件整体读入（缺省字段用默认值补齐）
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 队列配置
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            lease_duration: Duration::from_secs(self.lease_duration_secs),
            max_retries: self.max_retries,
            base_retry_delay: Duration::from_millis(self.base_retry_delay_ms),
            exhausted_retry_delay: Duration::from_millis(self.exhausted_retry_delay_ms),
            retry_delay_cap: Duration::from_millis(self.retry_delay_cap_ms),
        }
    }

    /// 代理池配置
    pub fn proxy_pool_config(&self) -> PoolConfig {
        self.pool_config(RotationStrategy::parse(&self.proxy_strategy))
    }

    /// 账号池配置
    pub fn account_pool_config(&self) -> PoolConfig {
        self.pool_config(RotationStrategy::parse(&self.account_strategy))
    }

    fn pool_config(&self, strategy: RotationStrategy) -> PoolConfig {
        PoolConfig {
            strategy,
            failure_threshold: self.failure_threshold,
            cooldown_base: Duration::from_secs(self.cooldown_base_secs),
            cooldown_cap: Duration::from_secs(self.cooldown_cap_secs),
            block_on_exhausted: self.pool_block_on_exhausted,
            checkout_timeout: Duration::from_secs(self.pool_checkout_timeout_secs),
        }
    }

    /// 指纹种子（0 视为不固定）
    pub fn fingerprint_seed(&self) -> Option<u64> {
        (self.fingerprint_seed != 0).then_some(self.fingerprint_seed)
    }

    /// 域名限速（0 视为关闭）
    pub fn per_domain_rpm(&self) -> Option<u32> {
        (self.per_domain_rpm != 0).then_some(self.per_domain_rpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_overrides_partial_fields() {
        let cfg = Config::from_toml(
            r#"
            max_concurrent_sessions = 8
            requests_per_minute = 120
            account_strategy = "weighted"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.max_concurrent_sessions, 8);
        assert_eq!(cfg.requests_per_minute, 120);
        assert_eq!(cfg.account_strategy, "weighted");
        // 未覆盖的字段保持默认
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.proxy_strategy, "round_robin");
    }

    #[test]
    fn test_zero_means_disabled() {
        let mut cfg = Config::default();
        cfg.per_domain_rpm = 0;
        cfg.fingerprint_seed = 0;
        assert_eq!(cfg.per_domain_rpm(), None);
        assert_eq!(cfg.fingerprint_seed(), None);

        cfg.per_domain_rpm = 30;
        cfg.fingerprint_seed = 42;
        assert_eq!(cfg.per_domain_rpm(), Some(30));
        assert_eq!(cfg.fingerprint_seed(), Some(42));
    }
}
