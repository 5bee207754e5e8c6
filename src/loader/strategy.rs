// 该文件是 Poubelle 项目的一部分。
// src/loader/strategy.rs - 加载策略
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

use std::path::PathBuf;

use tracing::debug;

use crate::artifact::{Checkpoint, Decode, TrustPolicy};
use crate::loader::{BaseArchitecture, LoadError};
use crate::model::{Detector, DetectorBackend, InferenceParams};

/// 一次加载中所有策略共享的输入，文件只读取一次
pub struct LoadContext<'a> {
  pub bytes: &'a [u8],
  pub decoder: &'a dyn Decode,
  pub backend: &'a dyn DetectorBackend,
  pub params: InferenceParams,
}

impl LoadContext<'_> {
  pub fn decode(&self, policy: &TrustPolicy) -> Result<Checkpoint, LoadError> {
    Ok(self.decoder.decode(self.bytes, policy)?)
  }

  pub fn build(&self, checkpoint: &Checkpoint) -> Result<Detector, LoadError> {
    Ok(Detector::from_checkpoint(checkpoint, self.backend, self.params)?)
  }
}

pub trait LoadStrategy: Send + Sync {
  fn name(&self) -> &'static str;
  fn attempt(&self, ctx: &LoadContext<'_>) -> Result<Detector, LoadError>;
}

/// 严格策略下直接构造
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectLoad;

impl LoadStrategy for DirectLoad {
  fn name(&self) -> &'static str {
    "direct"
  }

  fn attempt(&self, ctx: &LoadContext<'_>) -> Result<Detector, LoadError> {
    let checkpoint = ctx.decode(&TrustPolicy::strict())?;
    ctx.build(&checkpoint)
  }
}

/// 以允许列表作为策略参数重新解码
#[derive(Debug, Clone)]
pub struct AllowListLoad {
  policy: TrustPolicy,
}

impl AllowListLoad {
  pub fn new<I, S>(trusted: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      policy: TrustPolicy::with_trusted(trusted),
    }
  }
}

impl LoadStrategy for AllowListLoad {
  fn name(&self) -> &'static str {
    "allow_list"
  }

  fn attempt(&self, ctx: &LoadContext<'_>) -> Result<Detector, LoadError> {
    let checkpoint = ctx.decode(&self.policy)?;
    ctx.build(&checkpoint)
  }
}

#[derive(Debug, Clone)]
enum BaseSource {
  Inline(BaseArchitecture),
  File(PathBuf),
}

/// 关闭类型检查解码，只取参数字典移植到基础架构
#[derive(Debug, Clone)]
pub struct ReconstructLoad {
  base: BaseSource,
}

impl ReconstructLoad {
  pub fn new(base: BaseArchitecture) -> Self {
    Self {
      base: BaseSource::Inline(base),
    }
  }

  /// 每次尝试时读取，文件错误记为本策略的失败
  pub fn from_path(path: PathBuf) -> Self {
    Self {
      base: BaseSource::File(path),
    }
  }
}

impl LoadStrategy for ReconstructLoad {
  fn name(&self) -> &'static str {
    "reconstruct"
  }

  fn attempt(&self, ctx: &LoadContext<'_>) -> Result<Detector, LoadError> {
    let loaded;
    let base = match &self.base {
      BaseSource::Inline(base) => base,
      BaseSource::File(path) => {
        loaded = BaseArchitecture::load(path)?;
        &loaded
      }
    };

    let checkpoint = ctx.decode(&TrustPolicy::unrestricted())?;
    debug!(
      "产物包含 {} 个参数，基础架构 {} 需要 {} 个",
      checkpoint.header.params.len(),
      base.root,
      base.params.len()
    );
    let rebuilt = base.transplant(&checkpoint)?;
    ctx.build(&rebuilt)
  }
}
