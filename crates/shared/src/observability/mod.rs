//! 统一可观测性模块
//!
//! 提供 logging 与 metrics 描述的统一初始化。
//! 指标只通过 `metrics` facade 记录，由宿主进程决定安装何种 recorder。

pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 指标名称
pub mod names {
    /// 已完成评估的记录数
    pub const RECORDS_PROCESSED: &str = "rules_records_processed_total";
    /// 单条记录的评估耗时（秒）
    pub const RECORD_EVALUATION_SECONDS: &str = "rules_record_evaluation_seconds";
    /// 产出的规则结果节点数（含子结果）
    pub const RESULTS_PRODUCED: &str = "rules_results_total";
    /// 评估失败的规则数（含子规则）
    pub const RULE_FAILURES: &str = "rules_rule_failures_total";
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识日志来源
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// 日志级别（如 "info", "debug"），RUST_LOG 优先
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 是否启用 JSON 格式日志
    #[serde(default)]
    pub json_logs: bool,
}

fn default_service_name() -> String {
    "rules-broker".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// 从环境变量加载配置
    pub fn from_env(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| default_log_level()),
            json_logs: std::env::var("JSON_LOGS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// 注入服务名
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }
}

/// 初始化可观测性
///
/// 安装全局 tracing subscriber 并注册指标描述。
/// 同一进程内重复调用会返回错误。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    tracing::init(config)?;
    describe_metrics();

    info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "可观测性初始化完成"
    );

    Ok(())
}

/// 注册规则评估相关指标的描述
pub fn describe_metrics() {
    metrics::describe_counter!(
        names::RECORDS_PROCESSED,
        "Total number of records whose rules evaluation completed"
    );
    metrics::describe_histogram!(
        names::RECORD_EVALUATION_SECONDS,
        metrics::Unit::Seconds,
        "Evaluator time spent on a single record"
    );
    metrics::describe_counter!(
        names::RESULTS_PRODUCED,
        "Total number of rule result nodes produced, sub-results included"
    );
    metrics::describe_counter!(
        names::RULE_FAILURES,
        "Total number of failed rule or sub-rule results"
    );
}
