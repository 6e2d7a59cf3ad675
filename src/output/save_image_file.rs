// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
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
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameShape},
  input::url_path,
  output::{Render, draw::Draw},
  pipeline::PipelineResult,
};

/// 路径中的该占位符会被替换为帧序号
const INDEX_PLACEHOLDER: &str = "{index}";

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("无法绘制该帧: {0}")]
  UnsupportedFrame(FrameShape),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 把检测框画在帧上并保存为图像文件
pub struct SaveImageFileOutput {
  path: String,
  draw: Draw,
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

    Ok(Self::new(url_path(uri)))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().display().to_string(),
      draw: Draw::default(),
    }
  }

  pub fn path_for(&self, frame_index: u64) -> PathBuf {
    PathBuf::from(
      self
        .path
        .replace(INDEX_PLACEHOLDER, &frame_index.to_string()),
    )
  }

  fn save_image(&self, image: image::RgbImage, path: &Path) -> Result<(), SaveImageFileError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(path)?;
    info!("保存图像到文件: {}", path.display());

    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&mut self, result: &PipelineResult, frame: Option<&Frame>) -> Result<(), Self::Error> {
    let Some(frame) = frame else {
      debug!("第 {} 帧没有图像数据，跳过保存", result.frame_index);
      return Ok(());
    };

    let image = self
      .draw
      .draw_on_frame(frame, &result.detections)
      .ok_or(SaveImageFileError::UnsupportedFrame(frame.shape()))?;
    self.save_image(image, &self.path_for(result.frame_index))
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::{
    frame::PixelLayout,
    model::{BackendKind, BoundingBox, Detection, Label},
  };

  #[test]
  fn index_placeholder_is_replaced() {
    let output = SaveImageFileOutput::new("/tmp/out/frame_{index}.png");
    assert_eq!(output.path_for(12), PathBuf::from("/tmp/out/frame_12.png"));
  }

  #[test]
  fn saves_annotated_png() {
    let dir = std::env::temp_dir().join(format!("bianyuan-save-{}", std::process::id()));
    let mut output = SaveImageFileOutput::new(dir.join("frame_{index}.png"));

    let frame = Frame::zeroed(FrameShape::rgb(40, 20), PixelLayout::Nhwc);
    let result = PipelineResult {
      frame_index: 4,
      timestamp_ms: 0,
      frame: frame.shape(),
      substituted: true,
      backend: BackendKind::Placeholder,
      detections: vec![Detection {
        bbox: BoundingBox::new(12.0, 6.0, 28.0, 14.0),
        score: 0.9,
        label: Label::new(0, "object"),
      }],
      elapsed: Duration::ZERO,
    };

    output.render_result(&result, Some(&frame)).unwrap();
    let saved = image::open(dir.join("frame_4.png")).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (40, 20));
    assert_ne!(*saved.get_pixel(12, 6), image::Rgb([0, 0, 0]));
    std::fs::remove_dir_all(&dir).ok();
  }
}
