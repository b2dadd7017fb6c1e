//! 工作流校验
//!
//! 配置阶段在构建评估器之前检查工作流结构，任何违规都是配置错误。

use std::collections::HashSet;

use crate::error::{Result, RuleError};
use crate::models::{RuleDefinition, Workflow};

/// 工作流校验器
pub struct WorkflowValidator;

impl WorkflowValidator {
    /// 校验一组工作流，返回规则总数（含嵌套子规则）
    pub fn validate_all(workflows: &[Workflow]) -> Result<usize> {
        let mut names = HashSet::new();
        let mut total = 0;

        for workflow in workflows {
            Self::validate(workflow)?;

            if !names.insert(workflow.workflow_name.as_str()) {
                return Err(RuleError::Configuration(format!(
                    "工作流名称重复: {}",
                    workflow.workflow_name
                )));
            }

            total += workflow.rule_count();
        }

        Ok(total)
    }

    /// 校验单个工作流
    pub fn validate(workflow: &Workflow) -> Result<()> {
        if workflow.workflow_name.trim().is_empty() {
            return Err(RuleError::Configuration("工作流名称不能为空".to_string()));
        }

        if workflow.rules.is_empty() {
            return Err(RuleError::Configuration(format!(
                "工作流 '{}' 至少需要一条规则",
                workflow.workflow_name
            )));
        }

        Self::validate_rules(&workflow.rules, &workflow.workflow_name)
    }

    fn validate_rules(rules: &[RuleDefinition], path: &str) -> Result<()> {
        let mut siblings = HashSet::new();

        for (i, rule) in rules.iter().enumerate() {
            let rule_path = format!("{}.Rules[{}]", path, i);

            if rule.rule_name.trim().is_empty() {
                return Err(RuleError::Configuration(format!(
                    "规则 '{}' 的名称不能为空",
                    rule_path
                )));
            }

            if !siblings.insert(rule.rule_name.as_str()) {
                return Err(RuleError::Configuration(format!(
                    "规则名称在同级中重复: {} ({})",
                    rule.rule_name, rule_path
                )));
            }

            if rule.expression.trim().is_empty() && !rule.is_nested() {
                return Err(RuleError::Configuration(format!(
                    "规则 '{}' 需要表达式或子规则",
                    rule.rule_name
                )));
            }

            if rule.is_nested() {
                Self::validate_rules(&rule.rules, &format!("{}.{}", path, rule.rule_name))?;
            }
        }

        Ok(())
    }
}
