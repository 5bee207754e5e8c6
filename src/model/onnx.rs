// 该文件是 Poubelle 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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
use ort::{
  inputs,
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::artifact::Checkpoint;
use crate::model::{DetectorBackend, EngineError, InferenceEngine};

pub struct OnnxBackend {
  intra_threads: usize,
}

impl OnnxBackend {
  pub fn new(intra_threads: usize) -> Self {
    Self {
      intra_threads: intra_threads.max(1),
    }
  }
}

fn build_err(e: impl std::fmt::Display) -> EngineError {
  EngineError::Build(e.to_string())
}

fn run_err(e: impl std::fmt::Display) -> EngineError {
  EngineError::Run(e.to_string())
}

impl DetectorBackend for OnnxBackend {
  fn create_engine(&self, checkpoint: &Checkpoint) -> Result<Box<dyn InferenceEngine>, EngineError> {
    debug!(
      "模型负载大小: {:.2} MB",
      checkpoint.payload.len() as f64 / (1024.0 * 1024.0)
    );

    let session = Session::builder()
      .map_err(build_err)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(build_err)?
      .with_intra_threads(self.intra_threads)
      .map_err(build_err)?
      .commit_from_memory(&checkpoint.payload)
      .map_err(build_err)?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| EngineError::Build("模型没有输入".to_string()))?;
    let output_name = session
      .outputs
      .first()
      .map(|output| output.name.clone())
      .ok_or_else(|| EngineError::Build("模型没有输出".to_string()))?;

    info!("ONNX 会话已创建: 输入 '{}', 输出 '{}'", input_name, output_name);

    Ok(Box::new(OnnxEngine {
      session: Mutex::new(session),
      input_name,
      output_name,
    }))
  }
}

struct OnnxEngine {
  session: Mutex<Session>,
  input_name: String,
  output_name: String,
}

impl InferenceEngine for OnnxEngine {
  fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, EngineError> {
    let tensor = Tensor::from_array(input).map_err(run_err)?;
    let mut session = self.session.lock();
    let outputs = session
      .run(inputs![self.input_name.as_str() => tensor])
      .map_err(run_err)?;

    match outputs.get(self.output_name.as_str()) {
      Some(output) => Ok(output.try_extract_array::<f32>().map_err(run_err)?.into_owned()),
      None => {
        let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
        Err(EngineError::Run(format!(
          "未找到输出 '{}', 可用输出: {:?}",
          self.output_name, available
        )))
      }
    }
  }
}
