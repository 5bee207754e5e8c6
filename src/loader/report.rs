// 该文件是 Poubelle 项目的一部分。
// src/loader/report.rs - 加载诊断输出
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

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Info,
  Warning,
  Error,
}

/// 加载过程中的消息接收端，由调用方提供
pub trait Report: Send + Sync {
  fn report(&self, message: &str, severity: Severity);
}

/// 通过 tracing 输出
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReport;

impl Report for TracingReport {
  fn report(&self, message: &str, severity: Severity) {
    match severity {
      Severity::Info => info!("{}", message),
      Severity::Warning => warn!("{}", message),
      Severity::Error => error!("{}", message),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
  pub severity: Severity,
  pub message: String,
}

/// 收集消息，供页面或命令行展示
#[derive(Debug, Default)]
pub struct CollectReport {
  entries: Mutex<Vec<Diagnostic>>,
}

impl CollectReport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn entries(&self) -> Vec<Diagnostic> {
    self.entries.lock().clone()
  }

  pub fn messages(&self) -> Vec<String> {
    self.entries.lock().iter().map(|d| d.message.clone()).collect()
  }
}

impl Report for CollectReport {
  fn report(&self, message: &str, severity: Severity) {
    self.entries.lock().push(Diagnostic {
      severity,
      message: message.to_string(),
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn collect_report_keeps_order() {
    let report = CollectReport::new();
    report.report("premier", Severity::Info);
    report.report("second", Severity::Error);
    let entries = report.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message, "premier");
    assert_eq!(entries[1].severity, Severity::Error);
  }
}
