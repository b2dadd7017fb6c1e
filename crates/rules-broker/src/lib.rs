//! 规则代理
//!
//! 对业务记录批量执行外部定义的规则工作流，提供：
//! - 工作流定义读取（文件 / 内存仓储）与配置期校验
//! - 类型化记录到通用视图的投影
//! - 可插拔的表达式评估器边界
//! - 嵌套结果树展开与耗时分摊
//! - 自定义函数扩展（含利润移动平均）
//! - 执行进度与结果统计

pub mod broker;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod models;
pub mod progress;
pub mod record;
pub mod result_tree;
pub mod store;
pub mod summary;
pub mod validator;

pub use broker::{BrokerState, RulesBroker, RunStats};
pub use error::{Result, RuleError};
pub use evaluator::{Evaluator, EvaluatorHandle};
pub use functions::{
    ComplexRules, CustomFunction, FunctionProvider, FunctionRegistry, FunctionValue,
};
pub use models::{Children, OutcomeStatus, RawOutcome, RuleDefinition, RulesResult, Workflow};
pub use progress::{ProcessedCounter, ProgressReporter};
pub use record::{RecordView, RulesRecord, to_view};
pub use store::{FileRulesStore, MemoryRulesStore, RuleDefinitionStore};
pub use summary::{ExecutionSummary, RuleTally, summarize};
