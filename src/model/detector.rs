// 该文件是 Poubelle 项目的一部分。
// src/model/detector.rs - 检测器句柄
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::artifact::{Checkpoint, DETECT_TASK};
use crate::model::yolo::{self, YoloError};
use crate::model::{
  DetectResult, DetectorBackend, EngineError, InferenceEngine, InferenceParams, Model,
};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("不支持的任务类型: {0}")]
  UnsupportedTask(String),
  #[error("模型输入尺寸无效: {0}")]
  InvalidInputSize(u32),
  #[error("模型负载为空")]
  EmptyPayload,
  #[error("输入图像为空")]
  EmptyImage,
  #[error(transparent)]
  Engine(#[from] EngineError),
  #[error("输出解析失败: {0}")]
  Decode(#[from] YoloError),
}

/// 输入边长上限，letterbox 张量为 `3 * imgsz^2` 个 f32
pub const MAX_IMGSZ: u32 = 8192;
/// 检测头的最大下采样步长
pub const IMGSZ_STRIDE: u32 = 32;

/// 可直接推理的检测器，构造成功即完整可用
pub struct Detector {
  engine: Box<dyn InferenceEngine>,
  names: Vec<String>,
  imgsz: u32,
  root: String,
  params: InferenceParams,
}

impl std::fmt::Debug for Detector {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Detector")
      .field("root", &self.root)
      .field("names", &self.names)
      .field("imgsz", &self.imgsz)
      .field("params", &self.params)
      .finish_non_exhaustive()
  }
}

impl Detector {
  pub fn from_checkpoint(
    checkpoint: &Checkpoint,
    backend: &dyn DetectorBackend,
    params: InferenceParams,
  ) -> Result<Self, DetectorError> {
    let header = &checkpoint.header;
    if header.task != DETECT_TASK {
      return Err(DetectorError::UnsupportedTask(header.task.clone()));
    }
    if header.imgsz == 0 || header.imgsz > MAX_IMGSZ || header.imgsz % IMGSZ_STRIDE != 0 {
      return Err(DetectorError::InvalidInputSize(header.imgsz));
    }
    if checkpoint.payload.is_empty() {
      return Err(DetectorError::EmptyPayload);
    }

    let engine = backend.create_engine(checkpoint)?;
    info!(
      "检测器创建完成: {} ({} 个类别, 输入 {})",
      header.root,
      header.names.len(),
      header.imgsz
    );

    Ok(Self {
      engine,
      names: header.names.clone(),
      imgsz: header.imgsz,
      root: header.root.clone(),
      params,
    })
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn imgsz(&self) -> u32 {
    self.imgsz
  }

  pub fn root(&self) -> &str {
    &self.root
  }

  pub fn params(&self) -> &InferenceParams {
    &self.params
  }
}

impl Model for Detector {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = DetectorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    if input.width() == 0 || input.height() == 0 {
      return Err(DetectorError::EmptyImage);
    }

    let (tensor, letterbox) = yolo::letterbox(input, self.imgsz);
    debug!("执行模型推理");
    let output = self.engine.run(tensor)?;
    let items = yolo::decode(&output.view(), &self.names, &letterbox, &self.params)?;
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::artifact::ArtifactHeader;
  use ndarray::{Array3, Array4, ArrayD};

  struct FixedEngine(ArrayD<f32>);

  impl InferenceEngine for FixedEngine {
    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, EngineError> {
      assert_eq!(input.shape(), &[1, 3, 32, 32]);
      Ok(self.0.clone())
    }
  }

  struct FixedBackend;

  impl DetectorBackend for FixedBackend {
    fn create_engine(&self, _: &Checkpoint) -> Result<Box<dyn InferenceEngine>, EngineError> {
      let mut out = Array3::<f32>::zeros((1, 5, 3));
      for (c, v) in [16.0, 16.0, 8.0, 8.0, 0.75].into_iter().enumerate() {
        out[[0, c, 2]] = v;
      }
      Ok(Box::new(FixedEngine(out.into_dyn())))
    }
  }

  fn checkpoint() -> Checkpoint {
    let mut header = ArtifactHeader::new("collections.OrderedDict");
    header.names = vec!["poubelle".to_string()];
    header.imgsz = 32;
    Checkpoint::new(header, b"graph".to_vec())
  }

  #[test]
  fn infer_runs_engine_and_decodes() {
    let detector =
      Detector::from_checkpoint(&checkpoint(), &FixedBackend, InferenceParams::default()).unwrap();
    let result = detector.infer(&RgbImage::new(64, 64)).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].label, "poubelle");
    assert!((result.items[0].score - 0.75).abs() < 1e-6);
  }

  #[test]
  fn construction_validates_header() {
    let mut ckpt = checkpoint();
    ckpt.header.task = "segment".to_string();
    assert!(matches!(
      Detector::from_checkpoint(&ckpt, &FixedBackend, InferenceParams::default()),
      Err(DetectorError::UnsupportedTask(_))
    ));

    let mut ckpt = checkpoint();
    ckpt.payload.clear();
    assert!(matches!(
      Detector::from_checkpoint(&ckpt, &FixedBackend, InferenceParams::default()),
      Err(DetectorError::EmptyPayload)
    ));
  }

  #[test]
  fn input_size_must_be_bounded_stride_multiple() {
    for imgsz in [0, 100, MAX_IMGSZ + IMGSZ_STRIDE, u32::MAX] {
      let mut ckpt = checkpoint();
      ckpt.header.imgsz = imgsz;
      assert!(
        matches!(
          Detector::from_checkpoint(&ckpt, &FixedBackend, InferenceParams::default()),
          Err(DetectorError::InvalidInputSize(n)) if n == imgsz
        ),
        "imgsz {} 应被拒绝",
        imgsz
      );
    }

    let mut ckpt = checkpoint();
    ckpt.header.imgsz = MAX_IMGSZ;
    let detector =
      Detector::from_checkpoint(&ckpt, &FixedBackend, InferenceParams::default()).unwrap();
    assert_eq!(detector.imgsz(), MAX_IMGSZ);
  }
}
