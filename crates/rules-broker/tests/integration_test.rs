//! 规则代理集成测试
//!
//! 测试完整的规则读取、配置、批量执行、结果展开与统计流程。
//! 表达式评估器用按表达式文本查表的脚本评估器代替。

use async_trait::async_trait;
use chrono::NaiveDate;
use rules_broker::functions::ProfitEntry;
use rules_broker::{
    ComplexRules, Evaluator, EvaluatorHandle, FileRulesStore, FunctionRegistry, RawOutcome,
    RecordView, Result, RuleDefinition, RuleError, RulesBroker, RulesRecord, Workflow, summarize,
};
use rules_shared::config::{AppConfig, BrokerConfig, RepositoryConfig};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

// ==================== 测试记录 ====================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CompanyRecord {
    id: String,
    company_name: String,
    incorporation_country_code: String,
    credit_rating: u32,
    directors: Vec<String>,
    founded: NaiveDate,
    annual_profit: Vec<ProfitEntry>,
}

impl RulesRecord for CompanyRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn descriptor(&self) -> &str {
        &self.company_name
    }
}

fn company(name: &str, country: &str, rating: u32, directors: usize, profits: &[i64]) -> CompanyRecord {
    CompanyRecord {
        id: Uuid::new_v4().to_string(),
        company_name: name.to_string(),
        incorporation_country_code: country.to_string(),
        credit_rating: rating,
        directors: (0..directors).map(|i| format!("Director {}", i + 1)).collect(),
        founded: NaiveDate::from_ymd_opt(2001, 4, 1).unwrap(),
        annual_profit: profits
            .iter()
            .enumerate()
            .map(|(i, p)| ProfitEntry::new(2019 + i as i32, Decimal::from(*p)))
            .collect(),
    }
}

fn sample_companies() -> Vec<CompanyRecord> {
    vec![
        company("Test Company 1", "IE", 75, 2, &[10, 20, 30, 40, 50]),
        company("Test Company 2", "FR", 45, 0, &[10]),
        company("Test Company 3", "GB", 10, 1, &[]),
    ]
}

// ==================== 脚本评估器 ====================

type PredicateResult = std::result::Result<(bool, Option<Value>), String>;
type Predicate = Arc<dyn Fn(&RecordView, &FunctionRegistry) -> PredicateResult + Send + Sync>;

fn predicate<F>(f: F) -> Predicate
where
    F: Fn(&RecordView, &FunctionRegistry) -> PredicateResult + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
struct ScriptedEvaluator {
    predicates: HashMap<String, Predicate>,
}

impl ScriptedEvaluator {
    fn new() -> Self {
        let mut predicates: HashMap<String, Predicate> = HashMap::new();

        predicates.insert(
            "country_supported".to_string(),
            predicate(|view, _| {
                let code = view.get_field("IncorporationCountryCode").cloned();
                let supported = matches!(code.as_ref().and_then(Value::as_str), Some("IE" | "GB"));
                Ok((supported, if supported { None } else { code }))
            }),
        );
        predicates.insert(
            "has_directors".to_string(),
            predicate(|view, _| {
                let count = view
                    .get_field("Directors")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                Ok((count > 0, None))
            }),
        );
        for (expression, low, high) in [
            ("rating_red", 0, 30),
            ("rating_amber", 30, 60),
            ("rating_green", 60, 101),
        ] {
            predicates.insert(
                expression.to_string(),
                predicate(move |view, _| {
                    let rating = view
                        .get_field("CreditRating")
                        .and_then(Value::as_u64)
                        .ok_or("CreditRating missing")?;
                    Ok((rating >= low && rating < high, None))
                }),
            );
        }
        predicates.insert(
            "profit_average".to_string(),
            predicate(|view, functions| {
                let average = functions
                    .call("ProfitMovingAverage", view, &[json!("AnnualProfit"), json!(4)])
                    .map_err(|e| e.to_string())?;
                let growing = average.as_decimal().is_some_and(|d| d > Decimal::ZERO);
                Ok((growing, Some(Value::from(average))))
            }),
        );
        predicates.insert(
            "explode".to_string(),
            predicate(|_, _| Err("division by zero".to_string())),
        );

        Self { predicates }
    }
}

impl Evaluator for ScriptedEvaluator {
    fn configure(
        &self,
        workflows: &[Workflow],
        functions: FunctionRegistry,
    ) -> Result<Arc<dyn EvaluatorHandle>> {
        Ok(Arc::new(ScriptedHandle {
            workflows: workflows
                .iter()
                .map(|w| (w.workflow_name.clone(), w.clone()))
                .collect(),
            predicates: self.predicates.clone(),
            functions,
        }))
    }
}

struct ScriptedHandle {
    workflows: HashMap<String, Workflow>,
    predicates: HashMap<String, Predicate>,
    functions: FunctionRegistry,
}

impl ScriptedHandle {
    fn run(&self, rule: &RuleDefinition, view: &RecordView) -> RawOutcome {
        let failure_message = || {
            rule.error_message
                .clone()
                .unwrap_or_else(|| format!("Rule {} failed", rule.rule_name))
        };

        if rule.is_nested() {
            let children: Vec<RawOutcome> = rule
                .rules
                .iter()
                .filter(|r| r.enabled)
                .map(|r| self.run(r, view))
                .collect();
            let passed = match rule.operator.as_deref() {
                Some("Or") | Some("OrElse") => children.iter().any(RawOutcome::is_success),
                _ => children.iter().all(RawOutcome::is_success),
            };
            let outcome = if passed {
                RawOutcome::success(&rule.rule_name).with_success_event(rule.success_event.clone())
            } else {
                RawOutcome::failure(&rule.rule_name, failure_message())
            };
            return outcome.with_children(children);
        }

        let Some(check) = self.predicates.get(&rule.expression) else {
            return RawOutcome::failure(
                &rule.rule_name,
                format!("Unknown expression: {}", rule.expression),
            );
        };

        match check(view, &self.functions) {
            Ok((passed, output)) => {
                let mut outcome = if passed {
                    RawOutcome::success(&rule.rule_name)
                        .with_success_event(rule.success_event.clone())
                } else {
                    RawOutcome::failure(&rule.rule_name, failure_message())
                };
                outcome.output = output;
                outcome
            }
            Err(message) => RawOutcome::failure(&rule.rule_name, message),
        }
    }
}

#[async_trait]
impl EvaluatorHandle for ScriptedHandle {
    async fn evaluate(
        &self,
        workflow_name: &str,
        view: &RecordView,
    ) -> Result<Option<Vec<RawOutcome>>> {
        let workflow = self
            .workflows
            .get(workflow_name)
            .ok_or_else(|| RuleError::Evaluator(format!("Unknown workflow: {}", workflow_name)))?;

        Ok(Some(
            workflow
                .rules
                .iter()
                .filter(|r| r.enabled)
                .map(|r| self.run(r, view))
                .collect(),
        ))
    }
}

// ==================== 规则文件 ====================

const COMPANY_RULES: &str = r#"
[
    {
        "WorkflowName": "companyRules",
        "Rules": [
            {"RuleName": "CheckCountry", "Expression": "country_supported", "ErrorMessage": "Country not supported"},
            {"RuleName": "HasDirectors", "Expression": "has_directors", "ErrorMessage": "No directors"},
            {
                "RuleName": "CreditBand",
                "Operator": "Or",
                "SuccessEvent": "Banded",
                "Rules": [
                    {"RuleName": "Red", "Expression": "rating_red", "SuccessEvent": "Red"},
                    {"RuleName": "Amber", "Expression": "rating_amber", "SuccessEvent": "Amber"},
                    {"RuleName": "Green", "Expression": "rating_green", "SuccessEvent": "Green"}
                ]
            },
            {"RuleName": "ProfitTrend", "Expression": "profit_average", "SuccessEvent": "Growing"}
        ]
    }
]
"#;

const FRAGILE_RULES: &str = r#"
{
    "WorkflowName": "fragileRules",
    "Rules": [
        {"RuleName": "Explode", "Expression": "explode"},
        {"RuleName": "HasDirectors", "Expression": "has_directors"},
        {"RuleName": "Skipped", "Expression": "explode", "Enabled": false}
    ]
}
"#;

fn rules_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("companies.json"), COMPANY_RULES).unwrap();
    std::fs::write(dir.path().join("fragile.json"), FRAGILE_RULES).unwrap();
    dir
}

fn file_broker(dir: &tempfile::TempDir) -> RulesBroker {
    let broker = RulesBroker::new(
        Arc::new(FileRulesStore::new(dir.path())),
        Arc::new(ScriptedEvaluator::new()),
    );
    broker.register_function_provider(ComplexRules);
    broker
}

// ==================== 测试用例 ====================

#[tokio::test]
async fn test_company_workflow_end_to_end() {
    let dir = rules_dir();
    let broker = file_broker(&dir);
    broker.configure(["companies"]).await.unwrap();
    assert_eq!(broker.default_workflow().as_deref(), Some("companyRules"));

    let records = sample_companies();
    let results = broker.execute(&records, None).await.unwrap();

    // 每条记录 4 条顶层结果
    assert_eq!(results.len(), 12);
    assert_eq!(broker.processed(), 3);
    for (record, chunk) in records.iter().zip(results.chunks(4)) {
        let names: Vec<&str> = chunk.iter().map(|r| r.rule_name.as_str()).collect();
        assert_eq!(names, vec!["CheckCountry", "HasDirectors", "CreditBand", "ProfitTrend"]);
        assert!(chunk.iter().all(|r| r.record_id == record.id));
        assert!(chunk.iter().all(|r| r.record_description == record.company_name));
        assert!(chunk.iter().all(|r| r.rules_script == "companyRules"));

        let band = &chunk[2];
        let children: Vec<&str> = band.sub_results.iter().map(|r| r.rule_name.as_str()).collect();
        assert_eq!(children, vec!["Red", "Amber", "Green"]);
        assert!(band.success);
        assert_eq!(band.success_result.as_deref(), Some("Banded"));
    }

    let stats = broker.last_run();
    assert_eq!(stats.records, 3);
    assert_eq!(stats.results, 12);
}

#[tokio::test]
async fn test_moving_average_through_registry() {
    let dir = rules_dir();
    let broker = file_broker(&dir);
    broker.configure(["companies"]).await.unwrap();

    let results = broker.execute(&sample_companies(), None).await.unwrap();
    let trends: Vec<_> = results.iter().filter(|r| r.rule_name == "ProfitTrend").collect();

    // [10, 20, 30, 40, 50] -> 35
    assert!(trends[0].success);
    assert_eq!(trends[0].success_result.as_deref(), Some("Growing"));
    assert_eq!(trends[0].rule_output.as_ref().and_then(Value::as_f64), Some(35.0));

    // 少于 4 个值 -> 0
    assert!(!trends[1].success);
    assert_eq!(trends[1].rule_output.as_ref().and_then(Value::as_f64), Some(0.0));
    assert!(!trends[2].success);
}

#[tokio::test]
async fn test_rule_failures_are_isolated() {
    let dir = rules_dir();
    let broker = file_broker(&dir);
    broker.configure(["companies", "fragile"]).await.unwrap();

    let records = sample_companies();
    let results = broker.execute(&records, None).await.unwrap();

    // Test Company 2: 国家与董事检查失败，后续规则仍然评估
    let second = &results[4..8];
    assert!(!second[0].success);
    assert_eq!(second[0].last_error.as_deref(), Some("Country not supported"));
    assert_eq!(second[0].rule_output, Some(json!("FR")));
    assert!(!second[1].success);
    assert_eq!(second[1].last_error.as_deref(), Some("No directors"));
    assert!(second[2].success);
    assert_eq!(second[2].sub_results.as_slice()[1].success_result.as_deref(), Some("Amber"));

    // 表达式异常作为数据返回，不终止批次
    let fragile = broker.execute(&records, Some("fragileRules")).await.unwrap();
    assert_eq!(fragile.len(), 6);
    assert_eq!(broker.processed(), 3);
    for pair in fragile.chunks(2) {
        assert!(!pair[0].success);
        assert_eq!(pair[0].last_error.as_deref(), Some("division by zero"));
        assert_eq!(pair[1].rule_name, "HasDirectors");
        assert!(pair.iter().all(|r| r.rules_script == "fragileRules"));
    }
}

#[tokio::test]
async fn test_elapsed_time_shared_by_every_node_of_a_record() {
    let dir = rules_dir();
    let broker = file_broker(&dir);
    broker.configure(["companies"]).await.unwrap();

    let results = broker.execute(&sample_companies(), None).await.unwrap();

    for chunk in results.chunks(4) {
        let nodes: Vec<_> = chunk.iter().flat_map(|r| r.nodes()).collect();
        assert_eq!(nodes.len(), 7);

        let first = nodes[0].approx_execution_milliseconds;
        assert!(first >= 0.0);
        assert!(
            nodes
                .iter()
                .all(|n| (n.approx_execution_milliseconds - first).abs() < 1e-12)
        );
    }
}

#[tokio::test]
async fn test_missing_rules_file_leaves_broker_unconfigured() {
    let dir = rules_dir();
    let broker = file_broker(&dir);

    let err = broker.configure(["companies", "missing"]).await.unwrap_err();
    assert!(matches!(err, RuleError::NotFound { ref name, .. } if name == "missing"));
    assert!(err.is_configuration_failure());

    let err = broker.execute(&sample_companies(), None).await.unwrap_err();
    assert!(matches!(err, RuleError::NotConfigured));
}

#[tokio::test]
async fn test_summary_of_batch() {
    let dir = rules_dir();
    let broker = file_broker(&dir);
    broker.configure(["companies"]).await.unwrap();

    let results = broker.execute(&sample_companies(), None).await.unwrap();
    let summary = summarize(&results);

    assert_eq!(summary.results, 12);
    assert!(summary.min_ms <= summary.average_ms && summary.average_ms <= summary.max_ms);

    let country = &summary.rules["CheckCountry"];
    assert_eq!((country.successes, country.failures), (2, 1));

    let band = &summary.rules["CreditBand"];
    assert_eq!(band.successes, 3);
    assert_eq!(band.sub_rule_successes["Red"], 1);
    assert_eq!(band.sub_rule_successes["Amber"], 1);
    assert_eq!(band.sub_rule_successes["Green"], 1);
}

#[tokio::test]
async fn test_broker_from_config() {
    let dir = rules_dir();
    let config = AppConfig {
        repository: RepositoryConfig {
            root_dir: dir.path().to_path_buf(),
            default_extension: "json".to_string(),
        },
        broker: BrokerConfig {
            workflows: vec!["companies".to_string()],
            progress_interval_ms: 5,
        },
        ..Default::default()
    };

    let broker = RulesBroker::from_config(&config, Arc::new(ScriptedEvaluator::new()));
    broker.register_function_provider(ComplexRules);
    broker.configure(config.broker.workflows.clone()).await.unwrap();

    let reporter = broker.spawn_progress_reporter();
    let results = broker.execute(&sample_companies(), None).await.unwrap();

    assert_eq!(results.len(), 12);
    assert_eq!(reporter.stop().await, 3);
    assert_eq!(broker.last_run().records, 3);
}

#[tokio::test]
async fn test_results_serialize_with_stable_field_names() {
    let dir = rules_dir();
    let broker = file_broker(&dir);
    broker.configure(["companies"]).await.unwrap();

    let records = sample_companies();
    let results = broker.execute(&records[..1], None).await.unwrap();
    let value = serde_json::to_value(&results).unwrap();

    assert_eq!(value[0]["RecordId"], json!(records[0].id));
    assert_eq!(value[0]["RuleName"], json!("CheckCountry"));
    assert_eq!(value[0]["SubResults"], Value::Null);
    assert_eq!(value[2]["SubResults"][2]["SuccessResult"], json!("Green"));
}
