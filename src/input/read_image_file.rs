// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
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
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use super::descriptor::url_path;
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameShape, PixelLayout},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 静态图像输入：打开时解码一次，每次读取都返回同一帧
pub struct ImageFileInput {
  frame: Frame,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(url_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let frame = Frame::from(image.to_rgb8());
    info!("读取图像文件: {} ({})", path.display(), frame.shape());
    Ok(ImageFileInput { frame })
  }

  pub fn next_frame(&self) -> Frame {
    self.frame.clone()
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let shape = FrameShape::rgb(width as usize, height as usize);
    let data = image.into_raw();
    Frame::new(shape, PixelLayout::Nhwc, data)
      .unwrap_or_else(|_| Frame::zeroed(shape, PixelLayout::Nhwc))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn rgb_image_becomes_nhwc_frame() {
    let mut image = RgbImage::new(4, 2);
    image.put_pixel(3, 1, Rgb([10, 20, 30]));
    let frame = Frame::from(image);

    assert_eq!(frame.shape(), FrameShape::rgb(4, 2));
    assert_eq!(frame.layout(), PixelLayout::Nhwc);
    assert_eq!(frame.sample(3, 1, 0), Some(10));
    assert_eq!(frame.sample(3, 1, 2), Some(30));
  }

  #[test]
  fn reads_same_frame_every_time() {
    let dir = std::env::temp_dir().join(format!("bianyuan-image-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("still.png");
    RgbImage::from_pixel(20, 10, Rgb([1, 2, 3])).save(&path).unwrap();

    let input = ImageFileInput::open(&path).unwrap();
    assert_eq!(input.next_frame(), input.next_frame());
    assert_eq!(input.next_frame().shape(), FrameShape::rgb(20, 10));

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn scheme_must_match() {
    let url = Url::parse("pattern:///x.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
