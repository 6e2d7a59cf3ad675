// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/input/pattern.rs - 测试图样输入
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

use std::collections::HashMap;

use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FALLBACK_HEIGHT, FALLBACK_WIDTH, Frame, FrameShape, PixelLayout},
};

#[derive(Error, Debug)]
pub enum PatternInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Invalid pattern size: {0}")]
  InvalidSize(String),
}

/// 不依赖硬件的测试图样输入
///
/// `pattern://?width=640&height=480`，每次读取输出一幅随帧号平移的渐变图。
pub struct PatternInput {
  shape: FrameShape,
  counter: u64,
}

impl FromUrlWithScheme for PatternInput {
  const SCHEME: &'static str = "pattern";
}

impl FromUrl for PatternInput {
  type Error = PatternInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(PatternInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let width = parse_dimension(&query, "width", FALLBACK_WIDTH)?;
    let height = parse_dimension(&query, "height", FALLBACK_HEIGHT)?;

    PatternInput::new(FrameShape::rgb(width, height))
  }
}

fn parse_dimension(
  query: &HashMap<String, String>,
  key: &str,
  default: usize,
) -> Result<usize, PatternInputError> {
  match query.get(key) {
    None => Ok(default),
    Some(value) => match value.parse::<usize>() {
      Ok(v) if v > 0 => Ok(v),
      _ => Err(PatternInputError::InvalidSize(format!("{}={}", key, value))),
    },
  }
}

impl PatternInput {
  pub fn new(shape: FrameShape) -> Result<Self, PatternInputError> {
    if !shape.is_well_formed() {
      return Err(PatternInputError::InvalidSize(shape.to_string()));
    }
    shape
      .checked_byte_len()
      .map_err(|e| PatternInputError::InvalidSize(e.to_string()))?;
    Ok(Self { shape, counter: 0 })
  }

  pub fn next_frame(&mut self) -> Frame {
    let FrameShape {
      width,
      height,
      channels,
    } = self.shape;
    let offset = self.counter as usize;
    self.counter = self.counter.wrapping_add(1);

    let mut data = Vec::with_capacity(width * height * channels);
    for h in 0..height {
      for w in 0..width {
        for c in 0..channels {
          let value = match c {
            0 => (w + offset) * 255 / width.max(1),
            1 => h * 255 / height.max(1),
            _ => (w + h + offset) % 256,
          };
          data.push((value % 256) as u8);
        }
      }
    }

    Frame::new(self.shape, PixelLayout::Nhwc, data)
      .unwrap_or_else(|_| Frame::zeroed(self.shape, PixelLayout::Nhwc))
  }
}
