// 该文件是 Poubelle 项目的一部分。
// src/loader/cache.rs - 检测器缓存
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

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::loader::{LoadOutcome, ModelLoader, Report};

/// 单条目缓存：路径 → 加载结果，失败结果同样缓存
#[derive(Debug, Default)]
pub struct DetectorCache {
  entry: Mutex<Option<Arc<LoadOutcome>>>,
}

impl DetectorCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// 加载期间持有锁，并发请求不会重复加载
  pub fn get_or_load(
    &self,
    loader: &ModelLoader,
    path: &Path,
    report: &dyn Report,
  ) -> Arc<LoadOutcome> {
    let mut entry = self.entry.lock();
    if let Some(outcome) = entry.as_ref()
      && outcome.path() == path
    {
      debug!("缓存命中: {}", path.display());
      return outcome.clone();
    }

    let outcome = Arc::new(loader.load(path, report));
    *entry = Some(outcome.clone());
    outcome
  }

  pub fn peek(&self) -> Option<Arc<LoadOutcome>> {
    self.entry.lock().clone()
  }

  pub fn invalidate(&self) {
    if self.entry.lock().take().is_some() {
      debug!("检测器缓存已清除");
    }
  }
}
