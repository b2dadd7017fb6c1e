//! 记录视图适配
//!
//! 将任意可序列化的业务记录投影为通用结构化文档（map / sequence / scalar），
//! 作为类型化记录与表达式评估器之间唯一的边界类型。

use crate::error::{Result, RuleError};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::trace;

/// 可被规则代理处理的业务记录
///
/// 代理只读取标识与描述，其余字段通过序列化投影暴露给规则表达式。
pub trait RulesRecord: Serialize {
    /// 稳定的唯一标识
    fn id(&self) -> &str;

    /// 人类可读的描述
    fn descriptor(&self) -> &str;
}

/// 记录的通用视图
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordView {
    data: Value,
}

impl RecordView {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    /// 获取字段值（支持点号分隔的路径，如 "AnnualProfit.0.Profit"）
    pub fn get_field(&self, path: &str) -> Option<&Value> {
        let mut current = &self.data;

        for part in path.split('.') {
            match current {
                Value::Object(map) => {
                    current = map.get(part)?;
                }
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    current = arr.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }

    /// 获取底层数据
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn into_inner(self) -> Value {
        self.data
    }
}

/// 将记录投影为通用视图
///
/// 只有记录序列化表面上的字段可见；无法表示的结构（如非字符串键的 map）
/// 返回 `RuleError::Serialization`。不修改源记录。
pub fn to_view<R: RulesRecord>(record: &R) -> Result<RecordView> {
    let started = Instant::now();

    let data = serde_json::to_value(record).map_err(|source| RuleError::Serialization {
        record_id: record.id().to_string(),
        source,
    })?;

    trace!(
        record_id = record.id(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "记录已投影为视图"
    );

    Ok(RecordView::new(data))
}
