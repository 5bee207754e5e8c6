// 该文件是 Poubelle 项目的一部分。
// src/loader/base.rs - 基础架构与参数移植
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Poubelle 项目贡献者

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifact::{ArtifactHeader, Checkpoint, DEFAULT_IMGSZ, DETECT_TASK};
use crate::loader::LoadError;

fn default_imgsz() -> u32 {
  DEFAULT_IMGSZ
}

/// 已知可用的通用检测器描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseArchitecture {
  pub root: String,
  #[serde(default)]
  pub names: Vec<String>,
  #[serde(default = "default_imgsz")]
  pub imgsz: u32,
  pub params: BTreeMap<String, Vec<usize>>,
}

impl BaseArchitecture {
  pub fn load(path: &Path) -> Result<Self, LoadError> {
    let content = std::fs::read(path).map_err(|e| {
      LoadError::Unknown(format!("读取基础架构 {} 失败: {}", path.display(), e))
    })?;
    serde_json::from_slice(&content)
      .map_err(|e| LoadError::Unknown(format!("基础架构 {} 解析失败: {}", path.display(), e)))
  }

  /// 把产物的参数字典严格移植到基础架构上。
  /// 缺失、多余或形状不同的参数都会导致失败。
  pub fn transplant(&self, checkpoint: &Checkpoint) -> Result<Checkpoint, LoadError> {
    let loaded = &checkpoint.header.params;

    let missing: Vec<&str> = self
      .params
      .keys()
      .filter(|k| !loaded.contains_key(*k))
      .map(String::as_str)
      .collect();
    let unexpected: Vec<&str> = loaded
      .keys()
      .filter(|k| !self.params.contains_key(*k))
      .map(String::as_str)
      .collect();
    let reshaped: Vec<String> = self
      .params
      .iter()
      .filter_map(|(name, shape)| match loaded.get(name) {
        Some(found) if found != shape => Some(format!("{} {:?} -> {:?}", name, found, shape)),
        _ => None,
      })
      .collect();

    if !missing.is_empty() || !unexpected.is_empty() || !reshaped.is_empty() {
      let mut parts = Vec::new();
      if !missing.is_empty() {
        parts.push(format!("缺失参数 [{}]", missing.join(", ")));
      }
      if !unexpected.is_empty() {
        parts.push(format!("多余参数 [{}]", unexpected.join(", ")));
      }
      if !reshaped.is_empty() {
        parts.push(format!("形状不同 [{}]", reshaped.join(", ")));
      }
      return Err(LoadError::ShapeMismatch(parts.join("; ")));
    }

    let names = if checkpoint.header.names.len() == self.names.len() {
      checkpoint.header.names.clone()
    } else {
      debug!(
        "产物类别数 {} 与基础架构 {} 不同，使用基础架构的类别名",
        checkpoint.header.names.len(),
        self.names.len()
      );
      self.names.clone()
    };

    let header = ArtifactHeader {
      root: self.root.clone(),
      objects: Vec::new(),
      task: DETECT_TASK.to_string(),
      names,
      imgsz: self.imgsz,
      params: self.params.clone(),
    };
    debug!("已移植 {} 个参数到 {}", self.params.len(), self.root);
    Ok(Checkpoint::new(header, checkpoint.payload.clone()))
  }
}
