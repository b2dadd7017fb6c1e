//! 规则代理领域模型
//!
//! - `Workflow` / `RuleDefinition`：从规则定义仓储读取的工作流定义
//! - `RawOutcome`：外部评估器返回的原始规则结果树
//! - `RulesResult`：对外暴露的稳定结果模型

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// 工作流定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Workflow {
    pub workflow_name: String,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, rules: Vec<RuleDefinition>) -> Self {
        Self {
            workflow_name: name.into(),
            rules,
        }
    }

    /// 规则总数（含嵌套子规则）
    pub fn rule_count(&self) -> usize {
        self.rules.iter().map(RuleDefinition::rule_count).sum()
    }
}

/// 规则定义
///
/// 表达式文本对规则代理不透明，由外部评估器解释。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleDefinition {
    pub rule_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// 嵌套子规则的组合方式（如 And / Or），交由评估器解释
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_expression_type: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleDefinition>,
}

fn default_enabled() -> bool {
    true
}

impl RuleDefinition {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            rule_name: name.into(),
            expression: expression.into(),
            success_event: None,
            error_message: None,
            operator: None,
            enabled: true,
            rule_expression_type: None,
            properties: Map::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_success_event(mut self, event: impl Into<String>) -> Self {
        self.success_event = Some(event.into());
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_rules(mut self, operator: impl Into<String>, rules: Vec<RuleDefinition>) -> Self {
        self.operator = Some(operator.into());
        self.rules = rules;
        self
    }

    pub fn is_nested(&self) -> bool {
        !self.rules.is_empty()
    }

    /// 当前规则及其所有子规则的数量
    pub fn rule_count(&self) -> usize {
        1 + self.rules.iter().map(RuleDefinition::rule_count).sum::<usize>()
    }
}

/// 结果树节点的子节点
///
/// `Leaf` 表示没有子结果；`Nested` 总是非空（空列表会被归一化为 `Leaf`）。
/// 序列化为 `null` 或数组。
#[derive(Debug, Clone, PartialEq)]
pub enum Children<T> {
    Leaf,
    Nested(Vec<T>),
}

impl<T> Children<T> {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf)
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::Leaf => &[],
            Self::Nested(items) => items,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self {
            Self::Leaf => &mut [],
            Self::Nested(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T> Default for Children<T> {
    fn default() -> Self {
        Self::Leaf
    }
}

impl<T> From<Vec<T>> for Children<T> {
    fn from(items: Vec<T>) -> Self {
        if items.is_empty() {
            Self::Leaf
        } else {
            Self::Nested(items)
        }
    }
}

impl<T> From<Option<Vec<T>>> for Children<T> {
    fn from(items: Option<Vec<T>>) -> Self {
        items.map(Self::from).unwrap_or_default()
    }
}

impl<T: Serialize> Serialize for Children<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf => serializer.serialize_none(),
            Self::Nested(items) => serializer.serialize_some(items),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Children<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<Vec<T>>::deserialize(deserializer).map(Self::from)
    }
}

/// 原始规则结果的成功状态，失败时必带错误信息
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    Success,
    Failure { message: String },
}

/// 评估器返回的原始规则结果
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutcome {
    pub rule_name: String,
    pub status: OutcomeStatus,
    pub success_event: Option<String>,
    pub output: Option<Value>,
    pub children: Children<RawOutcome>,
}

impl RawOutcome {
    pub fn success(rule_name: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.into(),
            status: OutcomeStatus::Success,
            success_event: None,
            output: None,
            children: Children::Leaf,
        }
    }

    pub fn failure(rule_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.into(),
            status: OutcomeStatus::Failure {
                message: message.into(),
            },
            success_event: None,
            output: None,
            children: Children::Leaf,
        }
    }

    pub fn with_success_event(mut self, event: Option<String>) -> Self {
        self.success_event = event;
        self
    }

    pub fn with_output(mut self, output: impl Into<Value>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_children(mut self, children: Vec<RawOutcome>) -> Self {
        self.children = Children::from(children);
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success)
    }
}

/// 单条规则的评估结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RulesResult {
    pub record_id: String,
    pub record_description: String,
    pub rule_name: String,
    /// 产生该结果的工作流名称
    pub rules_script: String,
    pub success: bool,
    pub success_result: Option<String>,
    pub last_error: Option<String>,
    pub rule_output: Option<Value>,
    /// 记录评估耗时在所有结果节点上的平均分摊，并非单条规则的精确耗时
    pub approx_execution_milliseconds: f64,
    #[serde(default)]
    pub sub_results: Children<RulesResult>,
}

impl RulesResult {
    /// 当前节点及其所有子节点的数量
    pub fn node_count(&self) -> usize {
        1 + self
            .sub_results
            .iter()
            .map(RulesResult::node_count)
            .sum::<usize>()
    }

    /// 深度优先（先序）遍历所有节点
    pub fn nodes(&self) -> Vec<&RulesResult> {
        let mut nodes = Vec::with_capacity(self.node_count());
        self.collect_nodes(&mut nodes);
        nodes
    }

    fn collect_nodes<'a>(&'a self, nodes: &mut Vec<&'a RulesResult>) {
        nodes.push(self);
        for child in self.sub_results.iter() {
            child.collect_nodes(nodes);
        }
    }
}
