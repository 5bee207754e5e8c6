// 该文件是 Poubelle 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::info;

use crate::config::RenderConfig;
use crate::model::{DetectItem, DetectResult};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const PALETTE_SIZE: usize = 80;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("读取字体文件失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  Font(#[from] InvalidFont),
}

pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  line_width: u32,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    // 每个类别一种颜色，沿色相环均匀分布
    let colors = (0..PALETTE_SIZE)
      .map(|i| hsv_to_rgb((i as f32 / PALETTE_SIZE as f32) * 360.0, 0.8, 0.9))
      .collect();

    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      line_width: 2,
      colors,
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

impl Draw {
  /// 未配置字体时只绘制边框
  pub fn from_config(config: &RenderConfig) -> Result<Self, DrawError> {
    let mut draw = Self {
      line_width: config.line_width.max(1),
      ..Self::default()
    };
    if let Some(path) = &config.font {
      let data = std::fs::read(path)?;
      draw.font = Some(FontArc::try_from_vec(data)?);
      info!("已加载标签字体: {}", path.display());
    }
    Ok(draw)
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn color_of(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.items.iter() {
      self.draw_item(image, item);
    }
  }

  pub fn annotate(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut annotated = image.clone();
    self.draw_detections(&mut annotated, result);
    annotated
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_item(&self, image: &mut RgbImage, item: &DetectItem) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }
    let (w, h) = (image.width() as f32, image.height() as f32);
    let bbox = &item.bbox;

    let x_min = ((bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = self.color_of(item.class_id);
    let width = (x_max - x_min + 1) as u32;
    let height = (y_max - y_min + 1) as u32;

    // 向内逐层绘制以加粗边框
    for t in 0..self.line_width {
      let inner_w = width.saturating_sub(2 * t);
      let inner_h = height.saturating_sub(2 * t);
      if inner_w == 0 || inner_h == 0 {
        break;
      }
      let rect = Rect::at(x_min + t as i32, y_min + t as i32).of_size(inner_w, inner_h);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", item.label, item.score);
    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32;
    let text_height = self.label_text_height;

    // 标签放在边框上方，超出顶部时贴边
    let label_x = x_min;
    let label_y = (y_min - text_height).max(0);
    let max_width = (w as i32 - label_x).max(0);
    let label_width = text_width.min(max_width) as u32;

    if label_width > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, text_height as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }
}
