//! Application configuration module / 应用配置模块
//!
//! Manages configuration loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Global configuration instance / 全局配置实例
static CONFIG: OnceCell<Arc<RwLock<AppConfig>>> = OnceCell::new();

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database configuration / 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Search index configuration / 搜索索引配置
    #[serde(default)]
    pub search: SearchConfig,
    /// Paging defaults / 分页配置
    #[serde(default)]
    pub paging: PagingConfig,
}

/// Database configuration / 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Data directory path / 数据目录路径
    pub data_dir: String,
    /// Main database file path (relative to data_dir) / 主数据库文件路径
    pub db_file: String,
}

/// Search index configuration / 搜索索引配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Index partition directory (relative to data_dir) / 索引分区目录
    pub index_dir: String,
    /// Number of partitions per entity, 1 disables sharding / 每个实体的分区数
    pub shards: u32,
    /// Connections per partition pool / 每个分区的连接数
    pub max_connections: u32,
    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
    /// Rows loaded per batch while reindexing / 重建索引时每批行数
    pub batch_size: usize,
}

/// Paging configuration / 分页配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub default_page_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            db_file: "search_paging.db".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_dir: "search".to_string(),
            shards: 1,
            max_connections: 2,
            busy_timeout_ms: 10_000,
            batch_size: 500,
        }
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self { default_page_size: 20 }
    }
}

impl AppConfig {
    /// Get the full database URL / 获取完整的数据库URL
    pub fn get_database_url(&self) -> String {
        let db_path = Path::new(&self.database.data_dir).join(&self.database.db_file);
        format!("sqlite:{}?mode=rwc", db_path.to_string_lossy())
    }

    /// Get the full data directory path / 获取完整的数据目录路径
    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(&self.database.data_dir)
    }

    /// Get index partition directory / 获取索引分区目录
    pub fn get_index_dir(&self) -> PathBuf {
        let data_dir = self.get_data_dir();
        if self.search.index_dir.is_empty() {
            data_dir
        } else {
            data_dir.join(&self.search.index_dir)
        }
    }
}

/// Load configuration from the given file, or create it with defaults / 加载配置文件，不存在则创建默认配置
pub fn load_config_from(config_path: &Path) -> Result<AppConfig, String> {
    if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        let config = AppConfig::default();
        save_config_to(&config, config_path)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
pub fn save_config_to(config: &AppConfig, config_path: &Path) -> Result<(), String> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    std::fs::write(config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}

/// Initialize global configuration from a file / 初始化全局配置
pub fn init_config(config_path: &Path) -> Result<Arc<RwLock<AppConfig>>, String> {
    let config = load_config_from(config_path)?;

    let config_arc = Arc::new(RwLock::new(config));

    CONFIG
        .set(config_arc.clone())
        .map_err(|_| "Config already initialized".to_string())?;

    Ok(config_arc)
}

/// Get global configuration instance / 获取全局配置实例
///
/// Built-in defaults until [`init_config`] has run; never touches the filesystem.
pub fn get_config() -> Arc<RwLock<AppConfig>> {
    CONFIG
        .get_or_init(|| Arc::new(RwLock::new(AppConfig::default())))
        .clone()
}

/// Get a read-only snapshot of current config / 获取当前配置的只读快照
pub fn config() -> AppConfig {
    get_config().read().clone()
}
