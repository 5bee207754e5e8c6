// 该文件是 Poubelle 项目的一部分。
// src/artifact/trust.rs - 反序列化信任策略
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

use std::collections::BTreeSet;

/// 严格策略下始终允许的基础类型（容器、基本类型与张量重建函数）
pub const SAFE_GLOBALS: &[&str] = &[
  "builtins.dict",
  "builtins.list",
  "builtins.tuple",
  "builtins.set",
  "builtins.int",
  "builtins.float",
  "builtins.str",
  "builtins.bool",
  "collections.OrderedDict",
  "torch.Size",
  "torch.FloatStorage",
  "torch.HalfStorage",
  "torch._utils._rebuild_tensor_v2",
  "torch._utils._rebuild_parameter",
];

/// 默认允许列表：检测模型顶层类型以及其内部层模块类型
pub const DEFAULT_TRUSTED_TYPES: &[&str] = &[
  "ultralytics.nn.tasks.DetectionModel",
  "ultralytics.nn.modules.conv.Conv",
  "ultralytics.nn.modules.conv.Concat",
  "ultralytics.nn.modules.block.C2f",
  "ultralytics.nn.modules.block.Bottleneck",
  "ultralytics.nn.modules.block.SPPF",
  "ultralytics.nn.modules.block.DFL",
  "ultralytics.nn.modules.head.Detect",
  "torch.nn.modules.container.Sequential",
  "torch.nn.modules.container.ModuleList",
  "torch.nn.modules.conv.Conv2d",
  "torch.nn.modules.batchnorm.BatchNorm2d",
  "torch.nn.modules.activation.SiLU",
  "torch.nn.modules.pooling.MaxPool2d",
  "torch.nn.modules.upsampling.Upsample",
];

pub fn default_trusted_types() -> Vec<String> {
  DEFAULT_TRUSTED_TYPES.iter().map(|s| s.to_string()).collect()
}

/// 解码时传入的信任策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPolicy {
  /// 只允许 `SAFE_GLOBALS` 与集合内的类型
  Restricted(BTreeSet<String>),
  /// 完全关闭类型检查，仅用于来源可信的产物
  Unrestricted,
}

impl Default for TrustPolicy {
  fn default() -> Self {
    Self::strict()
  }
}

impl TrustPolicy {
  pub fn strict() -> Self {
    TrustPolicy::Restricted(BTreeSet::new())
  }

  pub fn with_trusted<I, S>(types: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    TrustPolicy::Restricted(types.into_iter().map(Into::into).collect())
  }

  pub fn unrestricted() -> Self {
    TrustPolicy::Unrestricted
  }

  pub fn is_trusted(&self, ident: &str) -> bool {
    match self {
      TrustPolicy::Unrestricted => true,
      TrustPolicy::Restricted(trusted) => {
        SAFE_GLOBALS.contains(&ident) || trusted.contains(ident)
      }
    }
  }

  /// 返回未被信任的类型标识，按字典序排列并去重
  pub fn untrusted<'a, I>(&self, idents: I) -> Vec<String>
  where
    I: IntoIterator<Item = &'a str>,
  {
    idents
      .into_iter()
      .filter(|ident| !self.is_trusted(ident))
      .map(str::to_string)
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strict_policy_only_trusts_safe_globals() {
    let policy = TrustPolicy::strict();
    assert!(policy.is_trusted("collections.OrderedDict"));
    assert!(policy.is_trusted("torch._utils._rebuild_tensor_v2"));
    assert!(!policy.is_trusted("ultralytics.nn.tasks.DetectionModel"));
  }

  #[test]
  fn untrusted_is_sorted_and_deduplicated() {
    let policy = TrustPolicy::with_trusted(["a.B"]);
    let missing = policy.untrusted(["z.Y", "a.B", "c.D", "z.Y", "builtins.list"]);
    assert_eq!(missing, vec!["c.D".to_string(), "z.Y".to_string()]);
  }

  #[test]
  fn unrestricted_trusts_everything() {
    assert!(TrustPolicy::unrestricted().untrusted(["evil.Payload"]).is_empty());
  }

  // 允许列表变更必须显式更新此处
  #[test]
  fn default_allow_list_is_pinned() {
    assert_eq!(
      DEFAULT_TRUSTED_TYPES,
      &[
        "ultralytics.nn.tasks.DetectionModel",
        "ultralytics.nn.modules.conv.Conv",
        "ultralytics.nn.modules.conv.Concat",
        "ultralytics.nn.modules.block.C2f",
        "ultralytics.nn.modules.block.Bottleneck",
        "ultralytics.nn.modules.block.SPPF",
        "ultralytics.nn.modules.block.DFL",
        "ultralytics.nn.modules.head.Detect",
        "torch.nn.modules.container.Sequential",
        "torch.nn.modules.container.ModuleList",
        "torch.nn.modules.conv.Conv2d",
        "torch.nn.modules.batchnorm.BatchNorm2d",
        "torch.nn.modules.activation.SiLU",
        "torch.nn.modules.pooling.MaxPool2d",
        "torch.nn.modules.upsampling.Upsample",
      ]
    );
  }
}
