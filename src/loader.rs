// 该文件是 Poubelle 项目的一部分。
// src/loader.rs - 模型加载器
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

//! 按顺序尝试多个加载策略，返回第一个成功构造的检测器。
//! 加载失败不会越过 [`ModelLoader::load`] 的边界，
//! 所有错误都记录在 [`LoadOutcome`] 中并发送给调用方提供的 [`Report`]。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::artifact::{ArtifactError, CheckpointCodec, Decode};
use crate::config::Config;
use crate::model::{Detector, DetectorBackend, DetectorError, InferenceParams};

mod base;
mod cache;
mod report;
mod strategy;

pub use self::base::BaseArchitecture;
pub use self::cache::DetectorCache;
pub use self::report::{CollectReport, Diagnostic, Report, Severity, TracingReport};
pub use self::strategy::{AllowListLoad, DirectLoad, LoadContext, LoadStrategy, ReconstructLoad};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
  #[error("模型文件未找到 (not found): {}", .0.display())]
  ArtifactMissing(PathBuf),
  #[error("反序列化被信任策略拒绝: {}", .0.join(", "))]
  DeserializationRejected(Vec<String>),
  #[error("参数与基础架构不匹配: {0}")]
  ShapeMismatch(String),
  #[error("未知加载错误: {0}")]
  Unknown(String),
}

impl LoadError {
  pub fn kind(&self) -> &'static str {
    match self {
      LoadError::ArtifactMissing(_) => "artifact_missing",
      LoadError::DeserializationRejected(_) => "deserialization_rejected",
      LoadError::ShapeMismatch(_) => "shape_mismatch",
      LoadError::Unknown(_) => "unknown",
    }
  }
}

impl From<ArtifactError> for LoadError {
  fn from(err: ArtifactError) -> Self {
    match err {
      ArtifactError::Rejected(types) => LoadError::DeserializationRejected(types),
      other => LoadError::Unknown(other.to_string()),
    }
  }
}

impl From<DetectorError> for LoadError {
  fn from(err: DetectorError) -> Self {
    LoadError::Unknown(err.to_string())
  }
}

/// 单次策略尝试，`error` 为 `None` 表示成功
#[derive(Debug, Clone)]
pub struct Attempt {
  pub strategy: &'static str,
  pub error: Option<LoadError>,
}

#[derive(Debug)]
pub struct LoadOutcome {
  path: PathBuf,
  detector: Option<Arc<Detector>>,
  precheck: Option<LoadError>,
  attempts: Vec<Attempt>,
}

impl LoadOutcome {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn detector(&self) -> Option<Arc<Detector>> {
    self.detector.clone()
  }

  pub fn is_loaded(&self) -> bool {
    self.detector.is_some()
  }

  pub fn attempts(&self) -> &[Attempt] {
    &self.attempts
  }

  /// 首个策略之后又执行了几个回退策略
  pub fn fallbacks_used(&self) -> usize {
    self.attempts.len().saturating_sub(1)
  }

  pub fn errors(&self) -> impl Iterator<Item = &LoadError> {
    self
      .precheck
      .iter()
      .chain(self.attempts.iter().filter_map(|a| a.error.as_ref()))
  }

  pub fn diagnostics(&self) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(err) = &self.precheck {
      lines.push(err.to_string());
    }
    for attempt in &self.attempts {
      if let Some(err) = &attempt.error {
        lines.push(format!("{}: {}", attempt.strategy, err));
      }
    }
    lines
  }
}

pub struct ModelLoader {
  decoder: Box<dyn Decode>,
  backend: Arc<dyn DetectorBackend>,
  strategies: Vec<Box<dyn LoadStrategy>>,
  params: InferenceParams,
}

impl ModelLoader {
  /// 空策略链，需通过 [`ModelLoader::with_strategy`] 追加
  pub fn new(backend: Arc<dyn DetectorBackend>, params: InferenceParams) -> Self {
    Self {
      decoder: Box::new(CheckpointCodec),
      backend,
      strategies: Vec::new(),
      params,
    }
  }

  /// 直接加载 → 允许列表 → 手动重建（配置了基础架构时）
  pub fn from_config(config: &Config, backend: Arc<dyn DetectorBackend>) -> Self {
    let mut loader = Self::new(backend, config.inference.params())
      .with_strategy(DirectLoad)
      .with_strategy(AllowListLoad::new(config.loader.trusted_types.iter().cloned()));
    if let Some(base) = &config.loader.base_architecture {
      loader = loader.with_strategy(ReconstructLoad::from_path(base.clone()));
    }
    loader
  }

  pub fn with_decoder(mut self, decoder: Box<dyn Decode>) -> Self {
    self.decoder = decoder;
    self
  }

  pub fn with_strategy(mut self, strategy: impl LoadStrategy + 'static) -> Self {
    self.strategies.push(Box::new(strategy));
    self
  }

  pub fn strategy_names(&self) -> Vec<&'static str> {
    self.strategies.iter().map(|s| s.name()).collect()
  }

  pub fn load(&self, path: &Path, report: &dyn Report) -> LoadOutcome {
    let mut outcome = LoadOutcome {
      path: path.to_path_buf(),
      detector: None,
      precheck: None,
      attempts: Vec::new(),
    };

    if !path.exists() {
      let err = LoadError::ArtifactMissing(path.to_path_buf());
      report.report(&err.to_string(), Severity::Error);
      outcome.precheck = Some(err);
      return outcome;
    }

    let bytes = match std::fs::read(path) {
      Ok(bytes) => bytes,
      Err(e) => {
        let err = LoadError::Unknown(format!("读取 {} 失败: {}", path.display(), e));
        report.report(&err.to_string(), Severity::Error);
        outcome.precheck = Some(err);
        return outcome;
      }
    };

    report.report(
      &format!("加载模型: {} ({} 字节)", path.display(), bytes.len()),
      Severity::Info,
    );

    let ctx = LoadContext {
      bytes: &bytes,
      decoder: self.decoder.as_ref(),
      backend: self.backend.as_ref(),
      params: self.params,
    };

    for strategy in &self.strategies {
      let name = strategy.name();
      report.report(&format!("尝试加载策略: {}", name), Severity::Info);
      match strategy.attempt(&ctx) {
        Ok(detector) => {
          report.report(&format!("策略 {} 加载成功", name), Severity::Info);
          outcome.attempts.push(Attempt {
            strategy: name,
            error: None,
          });
          outcome.detector = Some(Arc::new(detector));
          return outcome;
        }
        Err(err) => {
          report.report(&format!("策略 {} 失败: {}", name, err), Severity::Warning);
          outcome.attempts.push(Attempt {
            strategy: name,
            error: Some(err),
          });
        }
      }
    }

    report.report(
      &format!("所有加载策略均失败: {}", path.display()),
      Severity::Error,
    );
    outcome
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn artifact_errors_map_to_load_kinds() {
    let rejected: LoadError = ArtifactError::Rejected(vec!["a.B".to_string()]).into();
    assert_eq!(rejected, LoadError::DeserializationRejected(vec!["a.B".to_string()]));

    let malformed: LoadError = ArtifactError::Malformed("魔数不匹配".to_string()).into();
    assert_eq!(malformed.kind(), "unknown");
  }

  #[test]
  fn missing_message_names_the_path() {
    let err = LoadError::ArtifactMissing(PathBuf::from("models/best.ckpt"));
    let message = err.to_string();
    assert!(message.contains("not found"));
    assert!(message.contains("models/best.ckpt"));
  }
}
