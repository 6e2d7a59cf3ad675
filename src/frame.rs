// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/frame.rs - 帧定义
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

use serde::Serialize;
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

/// 替代帧的默认尺寸（640x480, RGB）
pub const FALLBACK_WIDTH: usize = 640;
pub const FALLBACK_HEIGHT: usize = 480;

/// 单帧像素数据的上限（256 MiB）
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// 像素排布方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
  /// 通道交错 [R0,G0,B0, R1,G1,B1, ...]
  #[default]
  Nhwc,
  /// 通道分平面 [R0...Rn, G0...Gn, B0...Bn]
  Nchw,
}

/// 帧的尺寸信息，不携带像素数据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FrameShape {
  pub width: usize,
  pub height: usize,
  pub channels: usize,
}

impl FrameShape {
  pub const fn new(width: usize, height: usize, channels: usize) -> Self {
    Self {
      width,
      height,
      channels,
    }
  }

  pub const fn rgb(width: usize, height: usize) -> Self {
    Self::new(width, height, RGB_CHANNELS)
  }

  /// 宽、高、通道数均非零
  pub fn is_well_formed(&self) -> bool {
    self.width > 0 && self.height > 0 && self.channels > 0
  }

  /// 按该尺寸存放像素所需的字节数，溢出时为 `None`
  pub fn byte_len(&self) -> Option<usize> {
    self
      .width
      .checked_mul(self.height)?
      .checked_mul(self.channels)
  }

  /// 同 `byte_len`，但超过 `MAX_FRAME_BYTES` 也视为错误
  pub fn checked_byte_len(&self) -> Result<usize, FrameError> {
    self
      .byte_len()
      .filter(|&len| len <= MAX_FRAME_BYTES)
      .ok_or(FrameError::TooLarge(*self))
  }
}

impl Default for FrameShape {
  fn default() -> Self {
    Self::rgb(FALLBACK_WIDTH, FALLBACK_HEIGHT)
  }
}

impl std::fmt::Display for FrameShape {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}x{}x{}", self.width, self.height, self.channels)
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("帧尺寸无效: {0}")]
  EmptyShape(FrameShape),
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("帧尺寸过大: {0}")]
  TooLarge(FrameShape),
}

/// 一帧图像。构造后像素数据不可再修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  shape: FrameShape,
  layout: PixelLayout,
  data: Box<[u8]>,
}

impl Frame {
  /// 由原始字节构造，字节数必须与尺寸一致
  pub fn new(shape: FrameShape, layout: PixelLayout, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = shape.checked_byte_len()?;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      shape,
      layout,
      data: data.into_boxed_slice(),
    })
  }

  /// 全零帧。尺寸过大时不分配像素，`validate` 会拒绝这样的帧。
  pub fn zeroed(shape: FrameShape, layout: PixelLayout) -> Self {
    let len = shape.checked_byte_len().unwrap_or(0);
    Self {
      shape,
      layout,
      data: vec![0u8; len].into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> FrameShape {
    self.shape
  }

  pub fn width(&self) -> usize {
    self.shape.width
  }

  pub fn height(&self) -> usize {
    self.shape.height
  }

  pub fn channels(&self) -> usize {
    self.shape.channels
  }

  pub fn layout(&self) -> PixelLayout {
    self.layout
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  /// 检查帧是否可以送入推理
  pub fn validate(&self) -> Result<(), FrameError> {
    if !self.shape.is_well_formed() {
      return Err(FrameError::EmptyShape(self.shape));
    }
    let expected = self.shape.checked_byte_len()?;
    if self.data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: self.data.len(),
      });
    }
    Ok(())
  }

  /// 读取 (x, y) 处第 c 个通道的值
  pub fn sample(&self, x: usize, y: usize, c: usize) -> Option<u8> {
    let FrameShape {
      width,
      height,
      channels,
    } = self.shape;
    if x >= width || y >= height || c >= channels {
      return None;
    }
    let index = match self.layout {
      PixelLayout::Nhwc => (y * width + x) * channels + c,
      PixelLayout::Nchw => c * height * width + y * width + x,
    };
    self.data.get(index).copied()
  }

  pub fn to_nhwc(&self) -> Frame {
    match self.layout {
      PixelLayout::Nhwc => self.clone(),
      PixelLayout::Nchw => self.relayout(PixelLayout::Nhwc),
    }
  }

  pub fn to_nchw(&self) -> Frame {
    match self.layout {
      PixelLayout::Nchw => self.clone(),
      PixelLayout::Nhwc => self.relayout(PixelLayout::Nchw),
    }
  }

  fn relayout(&self, target: PixelLayout) -> Frame {
    let FrameShape {
      width,
      height,
      channels,
    } = self.shape;
    let mut data = vec![0u8; self.data.len()];

    for c in 0..channels {
      for h in 0..height {
        for w in 0..width {
          let hwc = (h * width + w) * channels + c;
          let chw = c * height * width + h * width + w;
          match target {
            PixelLayout::Nchw => data[chw] = self.data[hwc],
            PixelLayout::Nhwc => data[hwc] = self.data[chw],
          }
        }
      }
    }

    Frame {
      shape: self.shape,
      layout: target,
      data: data.into_boxed_slice(),
    }
  }
}
