// 该文件是 Poubelle 项目的一部分。
// src/model/engine.rs - 推理引擎接口
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

use ndarray::{Array4, ArrayD};
use thiserror::Error;

use crate::artifact::Checkpoint;

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("推理引擎创建失败: {0}")]
  Build(String),
  #[error("推理执行失败: {0}")]
  Run(String),
}

/// 输入 NCHW 浮点张量，输出检测头原始张量
pub trait InferenceEngine: Send + Sync {
  fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, EngineError>;
}

/// 由解码后的产物创建推理引擎
pub trait DetectorBackend: Send + Sync {
  fn create_engine(&self, checkpoint: &Checkpoint) -> Result<Box<dyn InferenceEngine>, EngineError>;
}
