use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 优先级：ENV > config.toml > 默认值
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub budgets: BudgetConfig,
    #[serde(default)]
    pub ads: AdsConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub fraud: FraudConfig,
    #[serde(default)]
    pub segments: SegmentsConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// ENV 前缀：CE，分隔符：__
    /// 示例：CE__ADS__MIN_SCORE=0.4
    pub fn load(path: Option<&str>) -> Result<Self> {
        use config::{Config, Environment, File};

        let path = path.unwrap_or("config.toml");
        let required = std::path::Path::new(path).exists();

        let settings = Config::builder()
            .add_source(File::with_name(path).required(required))
            .add_source(
                Environment::with_prefix("CE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EngineError::config(format!("Failed to build config: {}", e)))?;

        let config: StaticConfig = settings
            .try_deserialize()
            .map_err(|e| EngineError::config(format!("Failed to deserialize config: {}", e)))?;

        if required {
            eprintln!("[INFO] Configuration loaded from: {}", path);
        }
        config.validate()?;
        Ok(config)
    }

    /// 基础一致性检查
    pub fn validate(&self) -> Result<()> {
        if self.fraud.suspect_threshold > self.fraud.block_threshold {
            return Err(EngineError::config(format!(
                "fraud.suspect_threshold ({}) must not exceed fraud.block_threshold ({})",
                self.fraud.suspect_threshold, self.fraud.block_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.ads.max_ad_ratio) {
            return Err(EngineError::config(format!(
                "ads.max_ad_ratio must be within [0, 1], got {}",
                self.ads.max_ad_ratio
            )));
        }
        if self.ads.frequency_cap == 0 {
            return Err(EngineError::config("ads.frequency_cap must be at least 1"));
        }
        if self.attribution.window_days == 0 {
            return Err(EngineError::config(
                "attribution.window_days must be at least 1",
            ));
        }
        if self.events.max_retained < self.events.max_buffered {
            return Err(EngineError::config(
                "events.max_retained must not be smaller than events.max_buffered",
            ));
        }
        if self.budgets.resolve_store_ms > self.budgets.resolve_ms {
            return Err(EngineError::config(
                "budgets.resolve_store_ms must not exceed budgets.resolve_ms",
            ));
        }
        Ok(())
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
    /// 允许携带 X-Forwarded-For 的代理（IP 或 CIDR）；为空时自动信任私有地址
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 缓存系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// memory | redis
    #[serde(rename = "type")]
    #[serde(default = "default_cache_type")]
    pub cache_type: String,
    #[serde(default = "default_link_ttl")]
    pub link_ttl_secs: u64,
    /// 过期后仍可作为降级数据返回的宽限期
    #[serde(default = "default_stale_grace")]
    pub stale_grace_secs: u64,
    #[serde(default = "default_negative_ttl")]
    pub negative_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
    #[serde(default = "default_bloom_fp_rate")]
    pub bloom_fp_rate: f64,
    /// 过滤器判定“不存在”时直接返回 404，不回源。
    /// 只适用于所有短码都经由本进程创建的单实例部署；CLI 或其他实例写入的短码在下次预热前不可见
    #[serde(default)]
    pub authoritative_filter: bool,
    #[serde(default)]
    pub redis: RedisConfig,
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// text | json
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// 接口令牌；为空时对应路由整体关闭
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub admin_token: String,
    #[serde(default)]
    pub collaborator_token: String,
}

/// 各阶段延迟预算（毫秒）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_resolve_ms")]
    pub resolve_ms: u64,
    #[serde(default = "default_resolve_store_ms")]
    pub resolve_store_ms: u64,
    #[serde(default = "default_select_ms")]
    pub select_ms: u64,
    #[serde(default = "default_conversion_ms")]
    pub conversion_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdsConfig {
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// 每个 viewer 每个 campaign 在周期内的最大展示次数
    #[serde(default = "default_frequency_cap")]
    pub frequency_cap: u32,
    #[serde(default = "default_frequency_period")]
    pub frequency_period_secs: u64,
    #[serde(default = "default_frequency_penalty_weight")]
    pub frequency_penalty_weight: f64,
    /// 每个会话中可填充广告的上下文比例上限
    #[serde(default = "default_max_ad_ratio")]
    pub max_ad_ratio: f64,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_tracker_capacity")]
    pub tracker_capacity: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudConfig {
    /// T1
    #[serde(default = "default_suspect_threshold")]
    pub suspect_threshold: u32,
    /// T2
    #[serde(default = "default_block_threshold")]
    pub block_threshold: u32,
    #[serde(default = "default_velocity_window")]
    pub velocity_window_secs: u64,
    #[serde(default = "default_velocity_soft_limit")]
    pub velocity_soft_limit: usize,
    #[serde(default = "default_velocity_hard_limit")]
    pub velocity_hard_limit: usize,
    #[serde(default = "default_shared_device_accounts")]
    pub shared_device_accounts: usize,
    #[serde(default = "default_ratio_min_clicks")]
    pub ratio_min_clicks: u64,
    /// 原因码权重，键为原因码名称
    #[serde(default = "default_fraud_weights")]
    pub weights: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentsConfig {
    #[serde(default = "default_segments_refresh")]
    pub refresh_secs: u64,
    #[serde(default = "default_segments_staleness")]
    pub staleness_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_events_flush_interval")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_events_max_buffered")]
    pub max_buffered: usize,
    /// 每类事件在内存中保留的上限；存储长时间不可用时超出部分丢弃最旧的事件
    #[serde(default = "default_events_max_retained")]
    pub max_retained: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: String,
    #[serde(default = "default_catalog_refresh")]
    pub refresh_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// 存储不可用且无缓存时的兜底跳转地址；为空则返回 "link not available"
    #[serde(default)]
    pub default_url: String,
    /// 存在性过滤器定期从存储重建，覆盖其他实例创建的短码
    #[serde(default = "default_rewarm_secs")]
    pub rewarm_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_url: String::new(),
            rewarm_secs: default_rewarm_secs(),
        }
    }
}

// ============================================================
// Default value functions
// ============================================================

fn default_rewarm_secs() -> u64 {
    600
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_database_url() -> String {
    "sqlite://commerce.db?mode=rwc".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    20
}

fn default_retry_max_delay_ms() -> u64 {
    500
}

fn default_cache_type() -> String {
    "memory".to_string()
}

fn default_link_ttl() -> u64 {
    300
}

fn default_stale_grace() -> u64 {
    3600
}

fn default_negative_ttl() -> u64 {
    60
}

fn default_cache_capacity() -> u64 {
    100_000
}

fn default_bloom_fp_rate() -> f64 {
    0.001
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_redis_key_prefix() -> String {
    "commerce:link:".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_resolve_ms() -> u64 {
    80
}

fn default_resolve_store_ms() -> u64 {
    40
}

fn default_select_ms() -> u64 {
    40
}

fn default_conversion_ms() -> u64 {
    2000
}

fn default_min_score() -> f64 {
    0.3
}

fn default_frequency_cap() -> u32 {
    3
}

fn default_frequency_period() -> u64 {
    86_400
}

fn default_frequency_penalty_weight() -> f64 {
    0.2
}

fn default_max_ad_ratio() -> f64 {
    0.5
}

fn default_session_ttl() -> u64 {
    1800
}

fn default_tracker_capacity() -> u64 {
    200_000
}

fn default_window_days() -> u32 {
    30
}

fn default_suspect_threshold() -> u32 {
    50
}

fn default_block_threshold() -> u32 {
    100
}

fn default_velocity_window() -> u64 {
    10
}

fn default_velocity_soft_limit() -> usize {
    3
}

fn default_velocity_hard_limit() -> usize {
    4
}

fn default_shared_device_accounts() -> usize {
    5
}

fn default_ratio_min_clicks() -> u64 {
    50
}

pub fn default_fraud_weights() -> BTreeMap<String, u32> {
    BTreeMap::from([
        ("velocity_elevated".to_string(), 50),
        ("velocity_excessive".to_string(), 60),
        ("conversion_ratio_anomaly".to_string(), 40),
        ("shared_device".to_string(), 60),
        ("self_referral".to_string(), 100),
    ])
}

fn default_segments_refresh() -> u64 {
    300
}

fn default_segments_staleness() -> u64 {
    86_400
}

fn default_events_flush_interval() -> u64 {
    2
}

fn default_events_max_buffered() -> usize {
    500
}

fn default_events_max_retained() -> usize {
    100_000
}

fn default_catalog_path() -> String {
    "catalog.toml".to_string()
}

fn default_catalog_refresh() -> u64 {
    60
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: default_cache_type(),
            link_ttl_secs: default_link_ttl(),
            stale_grace_secs: default_stale_grace(),
            negative_ttl_secs: default_negative_ttl(),
            max_capacity: default_cache_capacity(),
            bloom_fp_rate: default_bloom_fp_rate(),
            authoritative_filter: false,
            redis: RedisConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            resolve_ms: default_resolve_ms(),
            resolve_store_ms: default_resolve_store_ms(),
            select_ms: default_select_ms(),
            conversion_ms: default_conversion_ms(),
        }
    }
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            frequency_cap: default_frequency_cap(),
            frequency_period_secs: default_frequency_period(),
            frequency_penalty_weight: default_frequency_penalty_weight(),
            max_ad_ratio: default_max_ad_ratio(),
            session_ttl_secs: default_session_ttl(),
            tracker_capacity: default_tracker_capacity(),
        }
    }
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
        }
    }
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            suspect_threshold: default_suspect_threshold(),
            block_threshold: default_block_threshold(),
            velocity_window_secs: default_velocity_window(),
            velocity_soft_limit: default_velocity_soft_limit(),
            velocity_hard_limit: default_velocity_hard_limit(),
            shared_device_accounts: default_shared_device_accounts(),
            ratio_min_clicks: default_ratio_min_clicks(),
            weights: default_fraud_weights(),
        }
    }
}

impl Default for SegmentsConfig {
    fn default() -> Self {
        Self {
            refresh_secs: default_segments_refresh(),
            staleness_secs: default_segments_staleness(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_events_flush_interval(),
            max_buffered: default_events_max_buffered(),
            max_retained: default_events_max_retained(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            refresh_secs: default_catalog_refresh(),
        }
    }
}
