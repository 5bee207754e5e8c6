// 该文件是 Poubelle 项目的一部分。
// src/model/yolo.rs - YOLO 前处理与后处理
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

use image::{RgbImage, imageops::FilterType};
use ndarray::{Array4, ArrayViewD, Ix3};
use thiserror::Error;
use tracing::debug;

use crate::model::{DetectItem, InferenceParams};

const BOX_CHANNELS: usize = 4;
const PAD_VALUE: f32 = 114.0;

#[derive(Error, Debug, PartialEq)]
pub enum YoloError {
  #[error("不支持的输出形状: {0:?}")]
  UnsupportedShape(Vec<usize>),
  #[error("输出形状 {shape:?} 与类别数 {classes} 不符")]
  ChannelMismatch { shape: Vec<usize>, classes: usize },
}

/// 记录缩放与填充，用于把模型坐标映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub width: u32,
  pub height: u32,
}

impl Letterbox {
  /// (cx, cy, w, h) 模型坐标 -> 原图归一化 [x_min, y_min, x_max, y_max]
  pub fn to_normalized(&self, cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
    let (width, height) = (self.width as f32, self.height as f32);
    let x_min = ((cx - w / 2.0 - self.pad_x) / self.scale).clamp(0.0, width);
    let y_min = ((cy - h / 2.0 - self.pad_y) / self.scale).clamp(0.0, height);
    let x_max = ((cx + w / 2.0 - self.pad_x) / self.scale).clamp(0.0, width);
    let y_max = ((cy + h / 2.0 - self.pad_y) / self.scale).clamp(0.0, height);
    [x_min / width, y_min / height, x_max / width, y_max / height]
  }
}

/// 等比缩放到 imgsz x imgsz，居中填充，输出 NCHW [0, 1] 张量
pub fn letterbox(image: &RgbImage, imgsz: u32) -> (Array4<f32>, Letterbox) {
  let (width, height) = image.dimensions();
  let scale = (imgsz as f32 / width as f32).min(imgsz as f32 / height as f32);
  let new_w = ((width as f32 * scale).round() as u32).clamp(1, imgsz);
  let new_h = ((height as f32 * scale).round() as u32).clamp(1, imgsz);
  let offset_x = (imgsz - new_w) / 2;
  let offset_y = (imgsz - new_h) / 2;

  let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

  let size = imgsz as usize;
  let mut tensor = Array4::<f32>::from_elem((1, 3, size, size), PAD_VALUE / 255.0);
  for (x, y, pixel) in resized.enumerate_pixels() {
    let (tx, ty) = ((x + offset_x) as usize, (y + offset_y) as usize);
    for c in 0..3 {
      tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
    }
  }

  debug!(
    "letterbox: {}x{} -> {}x{}, 缩放 {:.4}, 偏移 ({}, {})",
    width, height, new_w, new_h, scale, offset_x, offset_y
  );

  (
    tensor,
    Letterbox {
      scale,
      pad_x: offset_x as f32,
      pad_y: offset_y as f32,
      width,
      height,
    },
  )
}

/// 解析 `[1, 4 + nc, N]` 或 `[1, N, 4 + nc]` 形式的检测头输出
pub fn decode(
  output: &ArrayViewD<f32>,
  names: &[String],
  letterbox: &Letterbox,
  params: &InferenceParams,
) -> Result<Vec<DetectItem>, YoloError> {
  let shape = output.shape().to_vec();
  if shape.len() != 3 || shape[0] != 1 {
    return Err(YoloError::UnsupportedShape(shape));
  }

  let channels = if names.is_empty() {
    shape[1].min(shape[2])
  } else {
    BOX_CHANNELS + names.len()
  };
  if channels <= BOX_CHANNELS {
    return Err(YoloError::UnsupportedShape(shape));
  }

  let channels_first = if shape[1] == channels {
    true
  } else if shape[2] == channels {
    false
  } else {
    return Err(YoloError::ChannelMismatch {
      shape,
      classes: names.len(),
    });
  };
  let anchors = if channels_first { shape[2] } else { shape[1] };
  let output = output
    .view()
    .into_dimensionality::<Ix3>()
    .map_err(|_| YoloError::UnsupportedShape(shape.clone()))?;
  let at = |anchor: usize, channel: usize| {
    if channels_first {
      output[[0, channel, anchor]]
    } else {
      output[[0, anchor, channel]]
    }
  };

  let mut candidates = Vec::new();
  for anchor in 0..anchors {
    let (class_id, score) = (BOX_CHANNELS..channels)
      .map(|c| (c - BOX_CHANNELS, at(anchor, c)))
      .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    if score < params.confidence {
      continue;
    }

    let bbox = letterbox.to_normalized(at(anchor, 0), at(anchor, 1), at(anchor, 2), at(anchor, 3));
    if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
      continue;
    }

    candidates.push(DetectItem {
      class_id: class_id as u32,
      label: names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| class_id.to_string()),
      score: score.clamp(0.0, 1.0),
      bbox,
    });
  }

  debug!("候选框 {} 个 (锚点 {} 个)", candidates.len(), anchors);
  let mut items = nms(candidates, params.iou);
  items.truncate(params.max_detections);
  Ok(items)
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);
  if x2 <= x1 || y2 <= y1 {
    return 0.0;
  }
  let intersection = (x2 - x1) * (y2 - y1);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  intersection / (area_a + area_b - intersection)
}

/// 按类别抑制重叠框，结果按置信度降序
pub fn nms(mut items: Vec<DetectItem>, threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));
  let mut kept: Vec<DetectItem> = Vec::with_capacity(items.len());
  for item in items {
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == item.class_id && iou(&k.bbox, &item.bbox) > threshold);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}
