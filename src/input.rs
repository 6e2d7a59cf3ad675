// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameError, FrameShape, PixelLayout},
};

mod camera;
mod descriptor;
mod pattern;

pub use self::camera::Camera;
pub use self::descriptor::SourceDescriptor;
pub(crate) use self::descriptor::url_path;
pub use self::pattern::{PatternInput, PatternInputError};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::{V4lInput, V4lInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder,
};

/// 打开视频源失败
#[derive(Error, Debug)]
pub enum SourceOpenError {
  #[error("无法打开视频源 {descriptor}: {reason}")]
  Unavailable { descriptor: String, reason: String },
  #[error("视频源 {0} 所需的输入后端未启用")]
  Unsupported(String),
  #[error("Test pattern input error: {0}")]
  PatternInputError(#[from] PatternInputError),
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "v4l_input")]
  #[error("V4L input error: {0}")]
  V4lInputError(#[from] V4lInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
}

/// 读取帧失败
#[derive(Error, Debug)]
pub enum ReadError {
  #[error("视频源未打开")]
  NotOpen,
  #[error("视频源打开失败: {0}")]
  Open(#[from] SourceOpenError),
  #[error("视频流已结束")]
  EndOfStream,
  #[error("读取帧超时 ({0:?})")]
  TimedOut(Duration),
  #[error("设备读取错误: {0}")]
  Device(String),
  #[error("帧数据无效: {0}")]
  Frame(#[from] FrameError),
}

/// 采集后端边界：只负责打开、读取一帧、关闭
pub trait CaptureBackend {
  type Handle;

  fn open_source(&mut self, descriptor: &SourceDescriptor) -> Result<Self::Handle, SourceOpenError>;
  fn read_one(&mut self, handle: &mut Self::Handle) -> Result<Frame, ReadError>;
  fn close_source(&mut self, handle: Self::Handle);
}

/// 帧来源的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
  Closed,
  Open,
  /// 打开失败，按替代帧策略继续提供占位帧
  Degraded,
}

/// 打开或读取失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
  /// SubstituteFrameOnFailure：记录警告并返回全零的替代帧
  #[default]
  SubstituteFrame,
  /// 直接把错误返回给调用方
  Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePolicy {
  /// AutoOpenOnRead：未打开时读取会先尝试打开
  pub auto_open_on_read: bool,
  pub on_failure: FailurePolicy,
  pub fallback_shape: FrameShape,
}

impl Default for SourcePolicy {
  fn default() -> Self {
    Self {
      auto_open_on_read: true,
      on_failure: FailurePolicy::SubstituteFrame,
      fallback_shape: FrameShape::default(),
    }
  }
}

impl SourcePolicy {
  pub fn strict() -> Self {
    Self {
      on_failure: FailurePolicy::Strict,
      ..Self::default()
    }
  }

  pub fn with_auto_open(mut self, auto_open_on_read: bool) -> Self {
    self.auto_open_on_read = auto_open_on_read;
    self
  }

  /// 尺寸无效或过大时保留原有的替代帧尺寸
  pub fn with_fallback_shape(mut self, shape: FrameShape) -> Self {
    match shape.checked_byte_len() {
      Ok(_) if shape.is_well_formed() => self.fallback_shape = shape,
      _ => warn!(
        "替代帧尺寸无效: {}，继续使用 {}",
        shape, self.fallback_shape
      ),
    }
    self
  }

  pub fn fallback_frame(&self) -> Frame {
    Frame::zeroed(self.fallback_shape, PixelLayout::Nhwc)
  }
}

/// 帧来源能力
pub trait FrameSource {
  /// 幂等；按策略决定打开失败是否返回错误
  fn open(&mut self) -> Result<(), SourceOpenError>;
  fn read(&mut self) -> Result<Frame, ReadError>;
  /// 幂等；未打开时调用也安全
  fn release(&mut self);
  fn state(&self) -> SourceState;
  /// 上一次成功的 `read` 是否返回了替代帧
  fn last_read_substituted(&self) -> bool;
}

/// 按描述符分派到具体输入后端
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptureWrapper;

pub enum CaptureHandle {
  Pattern(PatternInput),
  #[cfg(feature = "read_image_file")]
  ImageFile(ImageFileInput),
  #[cfg(feature = "v4l_input")]
  V4l(V4lInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerInput),
}

impl CaptureWrapper {
  fn open_url(url: &url::Url) -> Result<CaptureHandle, SourceOpenError> {
    if url.scheme() == PatternInput::SCHEME {
      return Ok(CaptureHandle::Pattern(PatternInput::from_url(url)?));
    }
    #[cfg(feature = "read_image_file")]
    {
      if url.scheme() == ImageFileInput::SCHEME {
        return Ok(CaptureHandle::ImageFile(ImageFileInput::from_url(url)?));
      }
    }
    #[cfg(feature = "v4l_input")]
    {
      if url.scheme() == V4lInput::SCHEME {
        return Ok(CaptureHandle::V4l(V4lInput::from_url(url)?));
      }
    }
    #[cfg(feature = "gstreamer_input")]
    {
      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(CaptureHandle::GStreamer(input));
      }
    }
    Err(SourceOpenError::Unsupported(url.to_string()))
  }

  fn open_device(index: u32) -> Result<CaptureHandle, SourceOpenError> {
    #[cfg(feature = "v4l_input")]
    {
      return Ok(CaptureHandle::V4l(V4lInput::open_index(index as usize)?));
    }
    #[cfg(not(feature = "v4l_input"))]
    {
      Err(SourceOpenError::Unsupported(format!("设备 #{}", index)))
    }
  }

  fn open_path(path: &std::path::Path) -> Result<CaptureHandle, SourceOpenError> {
    #[cfg(feature = "read_image_file")]
    {
      if descriptor::is_image_path(path) {
        return Ok(CaptureHandle::ImageFile(ImageFileInput::open(path)?));
      }
    }
    #[cfg(feature = "gstreamer_input")]
    {
      let input = GStreamerInputPipelineBuilder::file(path).build()?;
      return Ok(CaptureHandle::GStreamer(input));
    }
    #[cfg(not(feature = "gstreamer_input"))]
    {
      if !path.exists() {
        return Err(SourceOpenError::Unavailable {
          descriptor: path.display().to_string(),
          reason: "文件不存在".to_string(),
        });
      }
      Err(SourceOpenError::Unsupported(path.display().to_string()))
    }
  }
}

impl CaptureBackend for CaptureWrapper {
  type Handle = CaptureHandle;

  fn open_source(&mut self, descriptor: &SourceDescriptor) -> Result<Self::Handle, SourceOpenError> {
    match descriptor {
      SourceDescriptor::Device(index) => Self::open_device(*index),
      SourceDescriptor::Url(url) => Self::open_url(url),
      SourceDescriptor::Path(path) => Self::open_path(path),
    }
  }

  fn read_one(&mut self, handle: &mut Self::Handle) -> Result<Frame, ReadError> {
    match handle {
      CaptureHandle::Pattern(input) => Ok(input.next_frame()),
      #[cfg(feature = "read_image_file")]
      CaptureHandle::ImageFile(input) => Ok(input.next_frame()),
      #[cfg(feature = "v4l_input")]
      CaptureHandle::V4l(input) => input.next_frame(),
      #[cfg(feature = "gstreamer_input")]
      CaptureHandle::GStreamer(input) => input.next_frame(),
    }
  }

  fn close_source(&mut self, handle: Self::Handle) {
    // 各后端在 Drop 中释放设备
    drop(handle);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pattern_descriptor_opens_through_wrapper() {
    let mut wrapper = CaptureWrapper;
    let descriptor = SourceDescriptor::parse("pattern://?width=32&height=16");
    let mut handle = wrapper.open_source(&descriptor).unwrap();
    let frame = wrapper.read_one(&mut handle).unwrap();
    assert_eq!(frame.shape(), FrameShape::rgb(32, 16));
    wrapper.close_source(handle);
  }

  #[test]
  fn unknown_path_fails_to_open() {
    let mut wrapper = CaptureWrapper;
    let descriptor = SourceDescriptor::parse("/definitely/not/here.avi");
    assert!(wrapper.open_source(&descriptor).is_err());
  }

  #[test]
  fn strict_policy_keeps_fallback_shape() {
    let policy = SourcePolicy::strict().with_fallback_shape(FrameShape::rgb(8, 4));
    assert_eq!(policy.on_failure, FailurePolicy::Strict);
    assert!(policy.auto_open_on_read);
    assert_eq!(policy.fallback_frame().shape(), FrameShape::rgb(8, 4));
  }

  #[test]
  fn unusable_fallback_shape_is_ignored() {
    let policy = SourcePolicy::default()
      .with_fallback_shape(FrameShape::rgb(16, 8))
      .with_fallback_shape(FrameShape::rgb(usize::MAX, 2))
      .with_fallback_shape(FrameShape::rgb(0, 8));
    assert_eq!(policy.fallback_shape, FrameShape::rgb(16, 8));
    assert!(policy.fallback_frame().validate().is_ok());
  }
}
