//! 利润移动平均
//!
//! 固定窗口（k 个槽位，初始为 0）的简单移动平均，全程使用十进制运算。
//! 只返回处理完最后一个值之后的平均值；序列短于 k 时，未填充的槽位按 0 参与求和。

use super::{CustomFunction, FunctionProvider, FunctionValue};
use crate::error::{Result, RuleError};
use crate::record::RecordView;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// 移动平均窗口大小
pub const NUM_AVERAGES: usize = 4;

/// 函数提供者命名空间
pub const COMPLEX_RULES_NAMESPACE: &str = "ComplexRules";

/// 十进制移动平均窗口
#[derive(Debug, Clone)]
pub struct DecimalMovingAverage {
    values: Vec<Decimal>,
    index: usize,
    sum: Decimal,
}

impl DecimalMovingAverage {
    /// 创建大小为 `k` 的窗口，`k` 必须大于 0
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(RuleError::Configuration(
                "移动平均窗口大小必须大于 0".to_string(),
            ));
        }

        Ok(Self {
            values: vec![Decimal::ZERO; k],
            index: 0,
            sum: Decimal::ZERO,
        })
    }

    /// 写入下一个值并返回当前平均值
    ///
    /// 窗口和超出十进制表示范围时返回错误，窗口状态保持不变。
    pub fn update(&mut self, next: Decimal) -> Result<Decimal> {
        let sum = self
            .sum
            .checked_sub(self.values[self.index])
            .and_then(|s| s.checked_add(next))
            .ok_or_else(|| overflow(next))?;
        let average = sum
            .checked_div(Decimal::from(self.values.len()))
            .ok_or_else(|| overflow(next))?;

        self.sum = sum;
        self.values[self.index] = next;
        self.index = (self.index + 1) % self.values.len();

        Ok(average)
    }

    pub fn window_size(&self) -> usize {
        self.values.len()
    }
}

fn overflow(next: Decimal) -> RuleError {
    RuleError::function(
        ProfitMovingAverage::NAME,
        format!("移动平均计算溢出: 写入 {} 后窗口和超出十进制范围", next),
    )
}

/// 年度利润
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitEntry {
    #[serde(alias = "Year")]
    pub year: i32,
    #[serde(alias = "Amount", alias = "Profit")]
    pub amount: Decimal,
}

impl ProfitEntry {
    pub fn new(year: i32, amount: Decimal) -> Self {
        Self { year, amount }
    }
}

/// 计算利润序列的移动平均
///
/// 序列长度小于 `min_averages` 时返回 0。序列按给定顺序处理，不按年份重排。
pub fn profit_moving_average(profits: &[ProfitEntry], min_averages: i64) -> Result<Decimal> {
    let len = i64::try_from(profits.len()).unwrap_or(i64::MAX);
    if len < min_averages {
        return Ok(Decimal::ZERO);
    }

    let mut window = DecimalMovingAverage::new(NUM_AVERAGES)?;
    let mut average = Decimal::ZERO;

    for entry in profits {
        average = window.update(entry.amount)?;
    }

    Ok(average)
}

/// `ProfitMovingAverage(series, minAverages)`
///
/// `series` 可以是内联数组，也可以是相对记录视图的字段路径（如 "AnnualProfit"）。
#[derive(Debug, Default, Clone, Copy)]
pub struct ProfitMovingAverage;

impl ProfitMovingAverage {
    pub const NAME: &'static str = "ProfitMovingAverage";

    fn series(&self, view: &RecordView, arg: &Value) -> Result<Vec<ProfitEntry>> {
        let raw = match arg {
            Value::Array(_) => arg.clone(),
            Value::String(path) => view.get_field(path).cloned().ok_or_else(|| {
                RuleError::function(Self::NAME, format!("记录中不存在字段: {}", path))
            })?,
            Value::Null => return Ok(Vec::new()),
            other => {
                return Err(RuleError::function(
                    Self::NAME,
                    format!("利润序列参数类型无效: {}", other),
                ));
            }
        };

        if raw.is_null() {
            return Ok(Vec::new());
        }

        serde_json::from_value(raw)
            .map_err(|e| RuleError::function(Self::NAME, format!("利润序列格式无效: {}", e)))
    }

    fn min_averages(&self, arg: &Value) -> Result<i64> {
        let parsed = match arg {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };

        parsed.ok_or_else(|| {
            RuleError::function(Self::NAME, format!("minAverages 参数无效: {}", arg))
        })
    }
}

impl CustomFunction for ProfitMovingAverage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn call(&self, view: &RecordView, args: &[Value]) -> Result<FunctionValue> {
        let [series, min_averages] = args else {
            return Err(RuleError::function(
                Self::NAME,
                format!("需要 2 个参数 (series, minAverages)，实际 {} 个", args.len()),
            ));
        };

        let profits = self.series(view, series)?;
        let min_averages = self.min_averages(min_averages)?;

        profit_moving_average(&profits, min_averages).map(FunctionValue::Number)
    }
}

/// 复杂规则函数集
#[derive(Debug, Default, Clone, Copy)]
pub struct ComplexRules;

impl FunctionProvider for ComplexRules {
    fn namespace(&self) -> &str {
        COMPLEX_RULES_NAMESPACE
    }

    fn functions(&self) -> Vec<Arc<dyn CustomFunction>> {
        vec![Arc::new(ProfitMovingAverage)]
    }
}
