// 该文件是 Poubelle 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use crate::{FromUrl, FromUrlWithScheme};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI scheme 不匹配")]
  SchemeMismatch,
  #[error("路径解码失败: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像加载失败: {0}")]
  ImageLoad(#[from] image::ImageError),
}

const READ_IMAGE_FILE_SCHEME: &str = "image";

/// 单张图像输入，迭代一次后耗尽
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme 不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    let path = urlencoding::decode(url.path())?;
    debug!("读取图像文件: {}", path);
    let image = ImageReader::open(&*path)?.decode()?;

    Ok(ImageFileInput {
      image: Some(image.to_rgb8()),
    })
  }
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = READ_IMAGE_FILE_SCHEME;
}

impl ImageFileInput {
  /// 上传内容等内存数据，格式由内容推断
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageFileInputError> {
    let image = image::load_from_memory(bytes)?;
    Ok(ImageFileInput {
      image: Some(image.to_rgb8()),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn reads_percent_encoded_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bac plein.png");
    RgbImage::from_pixel(4, 3, Rgb([10, 20, 30])).save(&path).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&format!("image://{}", url.path())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    let image = input.next().unwrap();
    assert_eq!(image.dimensions(), (4, 3));
    assert_eq!(image.get_pixel(0, 0), &Rgb([10, 20, 30]));
    assert!(input.next().is_none());
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("file:///tmp/x.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemeMismatch)
    ));
  }

  #[test]
  fn from_bytes_rejects_garbage() {
    assert!(matches!(
      ImageFileInput::from_bytes(b"pas une image"),
      Err(ImageFileInputError::ImageLoad(_))
    ));
  }
}
