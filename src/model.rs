// 该文件是 Poubelle 项目的一部分。
// src/model.rs - 模型
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

use serde::{Deserialize, Serialize};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，相对原图归一化
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// 推理参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceParams {
  pub confidence: f32,
  pub iou: f32,
  pub max_detections: usize,
}

impl Default for InferenceParams {
  fn default() -> Self {
    Self {
      confidence: 0.25,
      iou: 0.7,
      max_detections: 300,
    }
  }
}

mod detector;
mod engine;
#[cfg(feature = "model_onnx")]
mod onnx;
pub mod yolo;

pub use self::detector::{Detector, DetectorError};
pub use self::engine::{DetectorBackend, EngineError, InferenceEngine};
#[cfg(feature = "model_onnx")]
pub use self::onnx::OnnxBackend;
