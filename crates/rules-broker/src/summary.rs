//! 执行结果统计

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::RulesResult;

/// 单条规则的成功/失败计数
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleTally {
    pub successes: usize,
    pub failures: usize,
    /// 子规则名称 -> 成功次数
    pub sub_rule_successes: BTreeMap<String, usize>,
}

impl RuleTally {
    pub fn total(&self) -> usize {
        self.successes + self.failures
    }

    pub fn success_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.successes as f64 / total as f64,
        }
    }
}

/// 一批结果的统计信息
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionSummary {
    /// 顶层结果数量
    pub results: usize,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// 按规则名称排序
    pub rules: BTreeMap<String, RuleTally>,
}

/// 统计顶层结果的耗时分布与每条规则的成功/失败次数
pub fn summarize(results: &[RulesResult]) -> ExecutionSummary {
    if results.is_empty() {
        return ExecutionSummary::default();
    }

    let mut summary = ExecutionSummary {
        results: results.len(),
        min_ms: f64::MAX,
        max_ms: f64::MIN,
        ..Default::default()
    };
    let mut total_ms = 0.0;

    for result in results {
        let ms = result.approx_execution_milliseconds;
        total_ms += ms;
        summary.min_ms = summary.min_ms.min(ms);
        summary.max_ms = summary.max_ms.max(ms);

        let tally = summary.rules.entry(result.rule_name.clone()).or_default();
        if result.success {
            tally.successes += 1;
        } else {
            tally.failures += 1;
        }

        for sub in result.sub_results.iter() {
            let count = tally
                .sub_rule_successes
                .entry(sub.rule_name.clone())
                .or_default();
            if sub.success {
                *count += 1;
            }
        }
    }

    summary.average_ms = total_ms / results.len() as f64;
    summary
}
