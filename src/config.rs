// 该文件是 Poubelle 项目的一部分。
// src/config.rs - 配置文件
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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::artifact::default_trusted_types;
use crate::model::InferenceParams;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("配置文件解析失败: {0}")]
  Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub server: ServerConfig,
  pub model: ModelConfig,
  pub loader: LoaderConfig,
  pub inference: InferenceConfig,
  pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub bind: String,
  pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind: "0.0.0.0:8000".to_string(),
      max_upload_bytes: 200 * 1024 * 1024,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
  pub path: PathBuf,
}

impl Default for ModelConfig {
  fn default() -> Self {
    Self {
      path: PathBuf::from("models/best.ckpt"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
  /// 允许列表的完整内容，配置后整体替换默认列表而非追加
  pub trusted_types: Vec<String>,
  /// 未配置时不启用手动重建
  pub base_architecture: Option<PathBuf>,
}

impl Default for LoaderConfig {
  fn default() -> Self {
    Self {
      trusted_types: default_trusted_types(),
      base_architecture: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
  pub confidence: f32,
  pub iou: f32,
  pub max_detections: usize,
  pub intra_threads: usize,
}

impl Default for InferenceConfig {
  fn default() -> Self {
    let params = InferenceParams::default();
    Self {
      confidence: params.confidence,
      iou: params.iou,
      max_detections: params.max_detections,
      intra_threads: 4,
    }
  }
}

impl InferenceConfig {
  pub fn params(&self) -> InferenceParams {
    InferenceParams {
      confidence: self.confidence,
      iou: self.iou,
      max_detections: self.max_detections,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
  pub font: Option<PathBuf>,
  pub line_width: u32,
}

impl Default for RenderConfig {
  fn default() -> Self {
    Self {
      font: None,
      line_width: 2,
    }
  }
}

impl Config {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
  }

  /// 文件不存在时使用默认配置
  pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
    if path.exists() {
      info!("加载配置文件: {}", path.display());
      Self::load(path)
    } else {
      info!("配置文件 {} 不存在，使用默认配置", path.display());
      Ok(Self::default())
    }
  }

  pub fn default_path() -> &'static str {
    "poubelle.toml"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "[model]\npath = \"/srv/poubelle/best.ckpt\"\n\n[inference]\nconfidence = 0.5\n"
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.model.path, PathBuf::from("/srv/poubelle/best.ckpt"));
    assert!((config.inference.confidence - 0.5).abs() < f32::EPSILON);
    assert!((config.inference.iou - 0.7).abs() < f32::EPSILON);
    assert_eq!(config.server, ServerConfig::default());
    assert_eq!(config.loader.trusted_types, default_trusted_types());
    assert!(config.loader.base_architecture.is_none());
  }

  #[test]
  fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, Config::default());
  }

  #[test]
  fn invalid_toml_is_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server\nbind = 1").unwrap();
    assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
  }
}
