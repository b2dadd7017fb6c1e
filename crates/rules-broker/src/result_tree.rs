//! 结果树适配
//!
//! 把评估器的原始结果树转换为对外的 `RulesResult` 树，并按节点数分摊记录耗时。

use std::time::Duration;

use crate::models::{Children, OutcomeStatus, RawOutcome, RulesResult};
use crate::record::RulesRecord;

/// 展开原始结果树
///
/// 原始结果为空时返回 `None`（而不是空列表）。纯函数：顺序与层级原样保留，
/// 缺失的可选字段在结果上保持为空。
pub fn flatten<R: RulesRecord + ?Sized>(
    record: &R,
    workflow_name: &str,
    outcomes: &[RawOutcome],
) -> Option<Vec<RulesResult>> {
    if outcomes.is_empty() {
        return None;
    }

    Some(
        outcomes
            .iter()
            .map(|outcome| to_result(record, workflow_name, outcome))
            .collect(),
    )
}

fn to_result<R: RulesRecord + ?Sized>(
    record: &R,
    workflow_name: &str,
    outcome: &RawOutcome,
) -> RulesResult {
    let (success, last_error) = match &outcome.status {
        OutcomeStatus::Success => (true, None),
        OutcomeStatus::Failure { message } => (false, Some(message.clone())),
    };

    let sub_results = match &outcome.children {
        Children::Leaf => Children::Leaf,
        Children::Nested(children) => Children::from(
            children
                .iter()
                .map(|child| to_result(record, workflow_name, child))
                .collect::<Vec<_>>(),
        ),
    };

    RulesResult {
        record_id: record.id().to_string(),
        record_description: record.descriptor().to_string(),
        rule_name: outcome.rule_name.clone(),
        rules_script: workflow_name.to_string(),
        success,
        success_result: outcome.success_event.clone(),
        last_error,
        rule_output: outcome.output.clone(),
        approx_execution_milliseconds: 0.0,
        sub_results,
    }
}

/// 结果树的节点总数（父节点与子节点）
pub fn count_nodes(results: &[RulesResult]) -> usize {
    results.iter().map(RulesResult::node_count).sum()
}

/// 把一条记录的耗时平均分摊到其结果树的每个节点上
pub fn apportion_elapsed(results: &mut [RulesResult], elapsed: Duration) {
    let nodes = count_nodes(results);
    if nodes == 0 {
        return;
    }

    let per_node = elapsed.as_secs_f64() * 1000.0 / nodes as f64;
    assign(results, per_node);
}

fn assign(results: &mut [RulesResult], per_node: f64) {
    for result in results {
        result.approx_execution_milliseconds = per_node;
        assign(result.sub_results.as_mut_slice(), per_node);
    }
}
