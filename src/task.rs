// 该文件是 Poubelle 项目的一部分。
// src/task.rs - 单次推理任务
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

use std::time::Duration;

use tracing::info;

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: &M, output: &O) -> Result<Self::Output, Self::Error>;
}

/// 单次任务的结果与耗时
#[derive(Debug)]
pub struct TaskReport<D> {
  pub result: D,
  pub inference: Duration,
  pub render: Duration,
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Output = TaskReport<D>;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: &M, output: &O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = model.infer(&frame)?;
    let inference = now.elapsed();
    info!("推理完成，耗时: {:.2?}", inference);

    let now = std::time::Instant::now();
    output.render_result(&frame, &result)?;
    let render = now.elapsed();
    info!("渲染完成，耗时: {:.2?}", render);

    Ok(TaskReport {
      result,
      inference,
      render,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;
  use thiserror::Error;

  #[derive(Error, Debug)]
  #[error("失败")]
  struct Failure;

  struct Double;

  impl Model for Double {
    type Input = u32;
    type Output = u32;
    type Error = Failure;

    fn infer(&self, input: &u32) -> Result<u32, Failure> {
      Ok(input * 2)
    }
  }

  #[derive(Default)]
  struct Remember(Cell<Option<(u32, u32)>>);

  impl Render<u32, u32> for Remember {
    type Error = Failure;

    fn render_result(&self, frame: &u32, result: &u32) -> Result<(), Failure> {
      self.0.set(Some((*frame, *result)));
      Ok(())
    }
  }

  #[test]
  fn one_shot_consumes_first_frame() {
    let output = Remember::default();
    let report = OneShotTask.run_task([21u32, 99].into_iter(), &Double, &output).unwrap();
    assert_eq!(report.result, 42);
    assert_eq!(output.0.get(), Some((21, 42)));
  }

  #[test]
  fn empty_input_is_an_error() {
    let output = Remember::default();
    assert!(OneShotTask.run_task(std::iter::empty::<u32>(), &Double, &output).is_err());
    assert!(output.0.get().is_none());
  }
}
