//! 规则代理错误类型
//!
//! 结构性错误（配置、查找、序列化）通过 `Result` 向调用方传播；
//! 单条规则的表达式失败不在此列，而是作为数据记录在 `RulesResult` 上。

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("配置失败: {0}")]
    Configuration(String),

    #[error("规则定义未找到: {name} (查找位置 {location})")]
    NotFound { name: String, location: String },

    #[error("规则代理尚未配置")]
    NotConfigured,

    #[error("记录 {record_id} 无法转换为通用视图: {source}")]
    Serialization {
        record_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("规则代理正在执行中，不允许重入调用")]
    AlreadyExecuting,

    #[error("表达式评估器错误: {0}")]
    Evaluator(String),

    #[error("自定义函数 {name} 调用失败: {message}")]
    Function { name: String, message: String },

    #[error("读取规则文件失败: {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("规则文件解析失败: {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, RuleError>;

impl RuleError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) | Self::Parse { .. } => "CONFIGURATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::AlreadyExecuting => "ALREADY_EXECUTING",
            Self::Evaluator(_) => "EVALUATOR_ERROR",
            Self::Function { .. } => "FUNCTION_ERROR",
            Self::Io { .. } => "IO_ERROR",
        }
    }

    /// 是否属于配置阶段的致命错误
    pub fn is_configuration_failure(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Parse { .. } | Self::NotFound { .. } | Self::Io { .. }
        )
    }

    pub(crate) fn function(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Function {
            name: name.into(),
            message: message.into(),
        }
    }
}
