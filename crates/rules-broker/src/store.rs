//! 规则定义仓储
//!
//! - `FileRulesStore`：从规则目录读取 JSON 工作流定义
//! - `MemoryRulesStore`：使用 DashMap 的内存仓储，适用于嵌入与测试

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use rules_shared::config::RepositoryConfig;

use crate::error::{Result, RuleError};
use crate::models::Workflow;

/// 规则定义仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleDefinitionStore: Send + Sync {
    /// 按名称读取工作流定义，结果按输入名称顺序追加
    ///
    /// 任何一个名称无法解析都返回 `RuleError::NotFound`，不返回部分结果。
    async fn read_rules(&self, names: &[String]) -> Result<Vec<Workflow>>;
}

/// 规则文件内容：工作流数组或单个工作流
#[derive(Deserialize)]
#[serde(untagged)]
enum WorkflowDocument {
    Many(Vec<Workflow>),
    One(Box<Workflow>),
}

impl WorkflowDocument {
    fn into_workflows(self) -> Vec<Workflow> {
        match self {
            Self::Many(workflows) => workflows,
            Self::One(workflow) => vec![*workflow],
        }
    }
}

/// 基于文件系统的规则仓储
#[derive(Debug, Clone)]
pub struct FileRulesStore {
    root: PathBuf,
    extension: String,
}

impl FileRulesStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "json".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self::new(config.resolved_root()).with_extension(config.default_extension.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 解析规则名称对应的文件路径
    ///
    /// 名称本身是已存在的文件时直接使用；否则在根目录下查找并替换为默认扩展名。
    pub async fn resolve(&self, name: &str) -> Result<PathBuf> {
        let direct = PathBuf::from(name);
        if is_file(&direct).await {
            return Ok(direct);
        }

        let candidate = self.root.join(name).with_extension(&self.extension);
        if is_file(&candidate).await {
            return Ok(candidate);
        }

        Err(RuleError::NotFound {
            name: name.to_string(),
            location: candidate.display().to_string(),
        })
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<Workflow>> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| RuleError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let document: WorkflowDocument =
            serde_json::from_str(&content).map_err(|source| RuleError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(document.into_workflows())
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

#[async_trait]
impl RuleDefinitionStore for FileRulesStore {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn read_rules(&self, names: &[String]) -> Result<Vec<Workflow>> {
        let mut workflows = Vec::new();

        for name in names {
            let path = self.resolve(name).await.inspect_err(|e| {
                warn!(name = %name, error = %e, "规则定义未找到");
            })?;

            let loaded = self.read_file(&path).await?;
            debug!(name = %name, path = %path.display(), count = loaded.len(), "规则文件已读取");
            workflows.extend(loaded);
        }

        info!(names = names.len(), workflows = workflows.len(), "规则定义读取完成");
        Ok(workflows)
    }
}

/// 内存规则仓储
#[derive(Clone, Default)]
pub struct MemoryRulesStore {
    documents: Arc<DashMap<String, Vec<Workflow>>>,
}

impl MemoryRulesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以名称登记一组工作流，覆盖同名条目
    pub fn insert(&self, name: impl Into<String>, workflows: Vec<Workflow>) {
        let name = name.into();
        debug!(name = %name, count = workflows.len(), "工作流已登记");
        self.documents.insert(name, workflows);
    }

    /// 从 JSON 文本登记（工作流数组或单个工作流）
    pub fn load_from_json(&self, name: impl Into<String>, json: &str) -> Result<usize> {
        let name = name.into();
        let document: WorkflowDocument =
            serde_json::from_str(json).map_err(|source| RuleError::Parse {
                path: PathBuf::from(&name),
                source,
            })?;

        let workflows = document.into_workflows();
        let count = workflows.len();
        self.insert(name, workflows);
        Ok(count)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.documents.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.documents.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl RuleDefinitionStore for MemoryRulesStore {
    async fn read_rules(&self, names: &[String]) -> Result<Vec<Workflow>> {
        let mut workflows = Vec::new();

        for name in names {
            let entry = self.documents.get(name).ok_or_else(|| RuleError::NotFound {
                name: name.clone(),
                location: "memory".to_string(),
            })?;
            workflows.extend(entry.value().iter().cloned());
        }

        Ok(workflows)
    }
}
