//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::observability::ObservabilityConfig;

/// 环境变量前缀（RULES_REPOSITORY__ROOT_DIR -> repository.root_dir）
const ENV_PREFIX: &str = "RULES";

/// 规则定义仓储配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// 规则文件根目录，相对路径基于当前工作目录解析
    pub root_dir: PathBuf,
    /// 规则名称解析为文件时使用的默认扩展名
    pub default_extension: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("Rules"),
            default_extension: "json".to_string(),
        }
    }
}

impl RepositoryConfig {
    /// 解析后的规则根目录
    pub fn resolved_root(&self) -> PathBuf {
        if self.root_dir.is_absolute() {
            return self.root_dir.clone();
        }

        std::env::current_dir()
            .map(|cwd| cwd.join(&self.root_dir))
            .unwrap_or_else(|_| self.root_dir.clone())
    }
}

/// 规则代理配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// 启动时加载的工作流名称，第一个解析成功的工作流作为默认工作流
    pub workflows: Vec<String>,
    /// 进度上报间隔（毫秒）
    pub progress_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            workflows: Vec::new(),
            progress_interval_ms: 1000,
        }
    }
}

impl BrokerConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub repository: RepositoryConfig,
    pub broker: BrokerConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（RULES_ 前缀，`__` 分隔层级，如 RULES_BROKER__PROGRESS_INTERVAL_MS）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("RULES_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(Path::new(&config_dir), service_name, &env)
    }

    /// 从指定目录加载配置
    pub fn load_from(
        config_dir: &Path,
        service_name: &str,
        environment: &str,
    ) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", environment)?
            .set_default("observability.service_name", service_name)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", environment))).required(false),
            )
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("broker.workflows")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
