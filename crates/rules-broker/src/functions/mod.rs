//! 自定义函数库
//!
//! 函数提供者在配置前注册到规则代理，配置时汇总为 `FunctionRegistry`
//! 交给评估器，规则表达式即可按名称调用。

pub mod moving_average;

pub use moving_average::{ComplexRules, DecimalMovingAverage, ProfitEntry, ProfitMovingAverage};

use crate::error::{Result, RuleError};
use crate::record::RecordView;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Number, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// 自定义函数返回值
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionValue {
    Bool(bool),
    Number(Decimal),
    Text(String),
}

impl FunctionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<FunctionValue> for Value {
    /// 数值在可表示为 JSON 数字时转换为数字，否则保留十进制字符串
    fn from(value: FunctionValue) -> Self {
        match value {
            FunctionValue::Bool(v) => Value::Bool(v),
            FunctionValue::Number(v) => v
                .to_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(v.to_string())),
            FunctionValue::Text(v) => Value::String(v),
        }
    }
}

/// 可在规则表达式中调用的自定义函数
pub trait CustomFunction: Send + Sync {
    fn name(&self) -> &str;

    /// 调用函数：接收记录视图与表达式中的字面量参数
    fn call(&self, view: &RecordView, args: &[Value]) -> Result<FunctionValue>;
}

/// 自定义函数提供者，以命名空间组织一组函数
pub trait FunctionProvider: Send + Sync {
    fn namespace(&self) -> &str;

    fn functions(&self) -> Vec<Arc<dyn CustomFunction>>;
}

/// 自定义函数注册表
///
/// 按限定名（`Namespace.Function`）注册；裸名仅在不冲突时可用。
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn CustomFunction>>,
    aliases: HashMap<String, String>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 汇总所有提供者的函数
    pub fn from_providers(providers: &[Arc<dyn FunctionProvider>]) -> Result<Self> {
        let mut registry = Self::new();
        let mut ambiguous = HashSet::new();

        for provider in providers {
            for function in provider.functions() {
                let bare = function.name().to_string();
                let qualified = format!("{}.{}", provider.namespace(), bare);

                if registry.functions.contains_key(&qualified) {
                    return Err(RuleError::Configuration(format!(
                        "自定义函数重复注册: {}",
                        qualified
                    )));
                }

                if registry.aliases.contains_key(&bare) {
                    ambiguous.insert(bare);
                } else {
                    registry.aliases.insert(bare, qualified.clone());
                }

                debug!(function = %qualified, "自定义函数已注册");
                registry.functions.insert(qualified, function);
            }
        }

        for bare in ambiguous {
            warn!(function = %bare, "自定义函数短名称冲突，需使用限定名称调用");
            registry.aliases.remove(&bare);
        }

        Ok(registry)
    }

    /// 按限定名或裸名查找函数
    pub fn get(&self, name: &str) -> Option<&Arc<dyn CustomFunction>> {
        self.functions.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|qualified| self.functions.get(qualified))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 调用函数
    pub fn call(&self, name: &str, view: &RecordView, args: &[Value]) -> Result<FunctionValue> {
        let function = self
            .get(name)
            .ok_or_else(|| RuleError::function(name, "未注册的自定义函数"))?;
        function.call(view, args)
    }

    /// 所有函数的限定名（排序后）
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}
