// 该文件是 Poubelle 项目的一部分。
// src/artifact.rs - 模型产物格式
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

//! 产物布局：`magic (8) | 头部长度 (u64 LE) | 头部 JSON | 负载`。
//! 负载是带权重的 ONNX 计算图，加载器不解析其内容。

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

mod trust;
pub use self::trust::{DEFAULT_TRUSTED_TYPES, SAFE_GLOBALS, TrustPolicy, default_trusted_types};

pub const ARTIFACT_MAGIC: &[u8; 8] = b"PBLCKPT\0";
const LEN_FIELD_SIZE: usize = 8;
const PREAMBLE_SIZE: usize = ARTIFACT_MAGIC.len() + LEN_FIELD_SIZE;

pub const DETECT_TASK: &str = "detect";
pub const DEFAULT_IMGSZ: u32 = 640;

#[derive(Error, Debug)]
pub enum ArtifactError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("产物格式无效: {0}")]
  Malformed(String),
  #[error("产物头部解析失败: {0}")]
  Header(#[from] serde_json::Error),
  #[error("拒绝反序列化未受信任的类型: {}", .0.join(", "))]
  Rejected(Vec<String>),
}

fn default_task() -> String {
  DETECT_TASK.to_string()
}

fn default_imgsz() -> u32 {
  DEFAULT_IMGSZ
}

/// 产物头部，描述序列化对象图与参数字典
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
  pub root: String,
  #[serde(default)]
  pub objects: Vec<String>,
  #[serde(default = "default_task")]
  pub task: String,
  #[serde(default)]
  pub names: Vec<String>,
  #[serde(default = "default_imgsz")]
  pub imgsz: u32,
  #[serde(default)]
  pub params: BTreeMap<String, Vec<usize>>,
}

impl ArtifactHeader {
  pub fn new(root: impl Into<String>) -> Self {
    Self {
      root: root.into(),
      objects: Vec::new(),
      task: default_task(),
      names: Vec::new(),
      imgsz: DEFAULT_IMGSZ,
      params: BTreeMap::new(),
    }
  }

  /// 对象图引用的全部类型（含根类型）
  pub fn referenced_types(&self) -> BTreeSet<&str> {
    std::iter::once(self.root.as_str())
      .chain(self.objects.iter().map(String::as_str))
      .collect()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
  pub header: ArtifactHeader,
  pub payload: Vec<u8>,
}

impl Checkpoint {
  pub fn new(header: ArtifactHeader, payload: Vec<u8>) -> Self {
    Self { header, payload }
  }

  pub fn encode(&self) -> Result<Vec<u8>, ArtifactError> {
    let header = serde_json::to_vec(&self.header)?;
    let mut bytes = Vec::with_capacity(PREAMBLE_SIZE + header.len() + self.payload.len());
    bytes.extend_from_slice(ARTIFACT_MAGIC);
    bytes.extend_from_slice(&(header.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&self.payload);
    Ok(bytes)
  }

  pub fn write_to(&self, path: &Path) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, self.encode()?)?;
    Ok(())
  }
}

/// 只读取头部，不做信任检查，供诊断展示使用
pub fn read_header(bytes: &[u8]) -> Result<ArtifactHeader, ArtifactError> {
  let (header, _) = split(bytes)?;
  Ok(serde_json::from_slice(header)?)
}

fn split(bytes: &[u8]) -> Result<(&[u8], &[u8]), ArtifactError> {
  if bytes.len() < PREAMBLE_SIZE {
    return Err(ArtifactError::Malformed(format!(
      "文件过短: {} 字节",
      bytes.len()
    )));
  }
  let (magic, rest) = bytes.split_at(ARTIFACT_MAGIC.len());
  if magic != ARTIFACT_MAGIC {
    return Err(ArtifactError::Malformed("魔数不匹配".to_string()));
  }
  let (len_field, rest) = rest.split_at(LEN_FIELD_SIZE);
  let mut len_bytes = [0u8; LEN_FIELD_SIZE];
  len_bytes.copy_from_slice(len_field);
  let header_len = u64::from_le_bytes(len_bytes);
  if header_len > rest.len() as u64 {
    return Err(ArtifactError::Malformed(format!(
      "头部长度 {} 超出剩余数据 {} 字节",
      header_len,
      rest.len()
    )));
  }
  Ok(rest.split_at(header_len as usize))
}

/// 反序列化入口
pub trait Decode: Send + Sync {
  fn decode(&self, bytes: &[u8], policy: &TrustPolicy) -> Result<Checkpoint, ArtifactError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CheckpointCodec;

impl Decode for CheckpointCodec {
  fn decode(&self, bytes: &[u8], policy: &TrustPolicy) -> Result<Checkpoint, ArtifactError> {
    let (header, payload) = split(bytes)?;
    let header: ArtifactHeader = serde_json::from_slice(header)?;

    let rejected = policy.untrusted(header.referenced_types());
    if !rejected.is_empty() {
      debug!("信任策略拒绝了 {} 个类型", rejected.len());
      return Err(ArtifactError::Rejected(rejected));
    }

    debug!(
      "产物解码完成: 根类型 {}, 负载 {} 字节",
      header.root,
      payload.len()
    );
    Ok(Checkpoint {
      header,
      payload: payload.to_vec(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn yolo_checkpoint() -> Checkpoint {
    let mut header = ArtifactHeader::new("ultralytics.nn.tasks.DetectionModel");
    header.objects = vec![
      "ultralytics.nn.modules.conv.Conv".to_string(),
      "collections.OrderedDict".to_string(),
    ];
    header.names = vec!["vide".to_string(), "pleine".to_string()];
    Checkpoint::new(header, b"graph".to_vec())
  }

  #[test]
  fn strict_decode_rejects_custom_types() {
    let bytes = yolo_checkpoint().encode().unwrap();
    match CheckpointCodec.decode(&bytes, &TrustPolicy::strict()) {
      Err(ArtifactError::Rejected(types)) => assert_eq!(
        types,
        vec![
          "ultralytics.nn.modules.conv.Conv".to_string(),
          "ultralytics.nn.tasks.DetectionModel".to_string(),
        ]
      ),
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[test]
  fn default_allow_list_accepts_yolo_graph() {
    let checkpoint = yolo_checkpoint();
    let bytes = checkpoint.encode().unwrap();
    let policy = TrustPolicy::with_trusted(DEFAULT_TRUSTED_TYPES.iter().copied());
    let decoded = CheckpointCodec.decode(&bytes, &policy).unwrap();
    assert_eq!(decoded, checkpoint);
  }

  #[test]
  fn header_defaults_are_filled_in() {
    let header: ArtifactHeader = serde_json::from_str(r#"{"root":"collections.OrderedDict"}"#).unwrap();
    assert_eq!(header.task, "detect");
    assert_eq!(header.imgsz, 640);
    assert!(header.names.is_empty());
  }

  #[test]
  fn bad_magic_is_malformed() {
    let mut bytes = yolo_checkpoint().encode().unwrap();
    bytes[0] = b'X';
    assert!(matches!(
      CheckpointCodec.decode(&bytes, &TrustPolicy::unrestricted()),
      Err(ArtifactError::Malformed(_))
    ));
  }

  #[test]
  fn oversized_header_length_is_malformed() {
    let mut bytes = ARTIFACT_MAGIC.to_vec();
    bytes.extend_from_slice(&1024u64.to_le_bytes());
    bytes.extend_from_slice(b"{}");
    assert!(matches!(read_header(&bytes), Err(ArtifactError::Malformed(_))));
  }
}
