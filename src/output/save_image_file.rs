// 该文件是 Poubelle 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectResult,
  output::{Render, draw::Draw},
};

pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("路径解码失败: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(urlencoding::decode(uri.path())?.into_owned()),
      draw: Draw::default(),
    })
  }
}

impl SaveImageFileOutput {
  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  fn save_image(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<RgbImage, DetectResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbImage, result: &DetectResult) -> Result<(), Self::Error> {
    let image = self.draw.annotate(frame, result);
    self.save_image(&image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  #[test]
  fn renders_into_nested_directory() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("sortie").join("annote.png");
    let url = Url::parse(&format!("image://{}", target.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    let result = DetectResult {
      items: vec![DetectItem {
        class_id: 0,
        label: "vide".to_string(),
        score: 0.5,
        bbox: [0.1, 0.1, 0.9, 0.9],
      }]
      .into_boxed_slice(),
    };
    output.render_result(&RgbImage::new(32, 32), &result).unwrap();

    let saved = image::open(&target).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (32, 32));
    assert_ne!(saved.get_pixel(3, 16), &image::Rgb([0, 0, 0]));
  }
}
