//! 表达式评估器边界
//!
//! 具体的表达式语言不属于规则代理，评估器以两个窄接口接入：
//! `Evaluator::configure` 绑定工作流与自定义函数，得到 `EvaluatorHandle`；
//! `EvaluatorHandle::evaluate` 针对单条记录视图评估一个工作流。

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::functions::FunctionRegistry;
use crate::models::{RawOutcome, Workflow};
use crate::record::RecordView;

/// 已配置的评估器句柄
///
/// 返回 `Ok(None)` 或空列表表示该记录没有产生任何结果。
/// 单条规则的表达式失败应作为 `OutcomeStatus::Failure` 返回；
/// 只有结构性错误（如未知工作流）才返回 `Err`。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EvaluatorHandle: Send + Sync {
    async fn evaluate(
        &self,
        workflow_name: &str,
        view: &RecordView,
    ) -> Result<Option<Vec<RawOutcome>>>;
}

/// 表达式评估器
#[cfg_attr(test, mockall::automock)]
pub trait Evaluator: Send + Sync {
    /// 基于工作流定义与自定义函数构建评估器句柄
    fn configure(
        &self,
        workflows: &[Workflow],
        functions: FunctionRegistry,
    ) -> Result<Arc<dyn EvaluatorHandle>>;
}
