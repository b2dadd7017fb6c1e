//! 规则代理
//!
//! 状态机：`Unconfigured -> Configured -> Executing -> Configured`。
//!
//! - 配置：从规则定义仓储读取工作流，校验后连同已注册的自定义函数交给评估器，
//!   生成的评估器句柄与默认工作流通过 `ArcSwapOption` 原子替换
//! - 执行：按输入顺序逐条评估记录，展开结果树并分摊耗时；
//!   单条规则失败只记录在结果中，结构性错误终止本批次
//! - 进度：原子计数器在每条记录完成后递增，可由 `ProgressReporter` 并发读取

use arc_swap::ArcSwapOption;
use metrics::{counter, histogram};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use rules_shared::config::AppConfig;
use rules_shared::observability::names;

use crate::error::{Result, RuleError};
use crate::evaluator::{Evaluator, EvaluatorHandle};
use crate::functions::{FunctionProvider, FunctionRegistry};
use crate::models::RulesResult;
use crate::progress::{ProcessedCounter, ProgressReporter};
use crate::record::{RulesRecord, to_view};
use crate::result_tree::{apportion_elapsed, count_nodes, flatten};
use crate::store::{FileRulesStore, RuleDefinitionStore};
use crate::validator::WorkflowValidator;

const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// 规则代理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Unconfigured,
    Configured,
    Executing,
}

/// 最近一次完成的执行统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunStats {
    pub records: usize,
    /// 顶层结果数量
    pub results: usize,
    /// 整个执行调用的墙钟耗时
    pub run_time: Duration,
}

/// 当前生效的配置
struct ActiveConfiguration {
    handle: Arc<dyn EvaluatorHandle>,
    default_workflow: String,
    workflow_names: Vec<String>,
}

/// 执行中标记，离开作用域时释放
struct ExecutionGuard<'a>(&'a AtomicBool);

impl<'a> ExecutionGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| RuleError::AlreadyExecuting)
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 规则代理
pub struct RulesBroker {
    store: Arc<dyn RuleDefinitionStore>,
    evaluator: Arc<dyn Evaluator>,
    providers: Mutex<Vec<Arc<dyn FunctionProvider>>>,
    active: ArcSwapOption<ActiveConfiguration>,
    executing: AtomicBool,
    processed: ProcessedCounter,
    last_run: Mutex<RunStats>,
    progress_interval: Duration,
}

impl RulesBroker {
    pub fn new(store: Arc<dyn RuleDefinitionStore>, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            store,
            evaluator,
            providers: Mutex::new(Vec::new()),
            active: ArcSwapOption::empty(),
            executing: AtomicBool::new(false),
            processed: ProcessedCounter::new(),
            last_run: Mutex::new(RunStats::default()),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// 使用文件仓储（`repository.root_dir`）构建规则代理
    pub fn from_config(config: &AppConfig, evaluator: Arc<dyn Evaluator>) -> Self {
        let store = FileRulesStore::from_config(&config.repository);
        info!(root = %store.root().display(), "规则代理使用文件仓储");

        Self::new(Arc::new(store), evaluator)
            .with_progress_interval(config.broker.progress_interval())
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// 注册自定义函数提供者
    ///
    /// 可多次调用并累积；在下一次 `configure` 时生效。
    pub fn register_function_provider<P: FunctionProvider + 'static>(&self, provider: P) {
        let provider: Arc<dyn FunctionProvider> = Arc::new(provider);
        debug!(namespace = provider.namespace(), "函数提供者已注册");
        self.providers.lock().push(provider);
    }

    /// 配置规则代理
    ///
    /// 任一名称无法解析、没有解析出工作流、校验或评估器构建失败时返回错误，
    /// 且不替换当前配置。成功后默认工作流为第一个解析出的工作流。
    #[instrument(skip_all)]
    pub async fn configure<I, S>(&self, workflow_names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = workflow_names.into_iter().map(Into::into).collect();

        let workflows = self.store.read_rules(&names).await.inspect_err(|e| {
            warn!(names = ?names, error = %e, "规则定义读取失败，配置未变更");
        })?;

        let default_workflow = workflows
            .first()
            .map(|w| w.workflow_name.clone())
            .ok_or_else(|| {
                RuleError::Configuration(format!("未解析到任何工作流: {:?}", names))
            })?;

        let rule_count = WorkflowValidator::validate_all(&workflows)?;

        let providers = self.providers.lock().clone();
        let functions = FunctionRegistry::from_providers(&providers)?;
        let function_count = functions.len();

        let handle = self.evaluator.configure(&workflows, functions)?;

        let workflow_names: Vec<String> =
            workflows.iter().map(|w| w.workflow_name.clone()).collect();

        info!(
            workflows = ?workflow_names,
            default_workflow = %default_workflow,
            rules = rule_count,
            functions = function_count,
            "规则代理配置完成"
        );

        self.active.store(Some(Arc::new(ActiveConfiguration {
            handle,
            default_workflow,
            workflow_names,
        })));

        Ok(())
    }

    /// 对一批记录执行工作流，`workflow_name` 为空时使用默认工作流
    ///
    /// 返回所有记录的结果（按记录输入顺序）。
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn execute<R>(
        &self,
        records: &[R],
        workflow_name: Option<&str>,
    ) -> Result<Vec<RulesResult>>
    where
        R: RulesRecord + Sync,
    {
        let active = self.active.load_full().ok_or(RuleError::NotConfigured)?;
        let _guard = ExecutionGuard::acquire(&self.executing)?;

        let workflow = workflow_name
            .unwrap_or(active.default_workflow.as_str())
            .to_string();
        if !active.workflow_names.iter().any(|name| name == &workflow) {
            return Err(RuleError::Evaluator(format!(
                "工作流未配置: {} (已配置 {:?})",
                workflow, active.workflow_names
            )));
        }

        self.processed.reset();
        *self.last_run.lock() = RunStats::default();

        let started = Instant::now();
        let mut output = Vec::new();

        for record in records {
            let view = to_view(record)?;

            let record_started = Instant::now();
            let outcomes = active.handle.evaluate(&workflow, &view).await?;
            let elapsed = record_started.elapsed();

            match outcomes.as_deref().and_then(|o| flatten(record, &workflow, o)) {
                Some(mut results) => {
                    apportion_elapsed(&mut results, elapsed);
                    self.record_metrics(&workflow, &results);
                    output.extend(results);
                }
                None => debug!(record_id = record.id(), "记录没有产生规则结果"),
            }

            histogram!(names::RECORD_EVALUATION_SECONDS, "workflow" => workflow.clone())
                .record(elapsed.as_secs_f64());
            counter!(names::RECORDS_PROCESSED, "workflow" => workflow.clone()).increment(1);
            self.processed.increment();
        }

        let stats = RunStats {
            records: records.len(),
            results: output.len(),
            run_time: started.elapsed(),
        };
        *self.last_run.lock() = stats;

        info!(
            workflow = %workflow,
            records = stats.records,
            results = stats.results,
            run_time_ms = stats.run_time.as_millis() as u64,
            "规则执行完成"
        );

        Ok(output)
    }

    fn record_metrics(&self, workflow: &str, results: &[RulesResult]) {
        let nodes = count_nodes(results);
        let failures = results
            .iter()
            .flat_map(RulesResult::nodes)
            .filter(|node| !node.success)
            .count();

        counter!(names::RESULTS_PRODUCED, "workflow" => workflow.to_string())
            .increment(nodes as u64);
        if failures > 0 {
            counter!(names::RULE_FAILURES, "workflow" => workflow.to_string())
                .increment(failures as u64);
        }
    }

    /// 当前执行中已完成的记录数
    pub fn processed(&self) -> usize {
        self.processed.get()
    }

    /// 共享的计数器，可交给外部进度显示
    pub fn processed_counter(&self) -> ProcessedCounter {
        self.processed.clone()
    }

    /// 最近一次完成的执行耗时
    pub fn run_time(&self) -> Duration {
        self.last_run.lock().run_time
    }

    pub fn last_run(&self) -> RunStats {
        *self.last_run.lock()
    }

    pub fn state(&self) -> BrokerState {
        if self.executing.load(Ordering::Acquire) {
            BrokerState::Executing
        } else if self.active.load().is_some() {
            BrokerState::Configured
        } else {
            BrokerState::Unconfigured
        }
    }

    pub fn default_workflow(&self) -> Option<String> {
        self.active
            .load_full()
            .map(|active| active.default_workflow.clone())
    }

    /// 当前配置的工作流名称
    pub fn workflows(&self) -> Vec<String> {
        self.active
            .load_full()
            .map(|active| active.workflow_names.clone())
            .unwrap_or_default()
    }

    /// 启动进度上报任务，使用配置的上报间隔
    pub fn spawn_progress_reporter(&self) -> ProgressReporter {
        ProgressReporter::spawn(self.processed.clone(), self.progress_interval)
    }
}
