// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入模块
//!
//! 支持两类来源：
//! - 视频文件：`gst://file/path/to/video.mp4`，或直接给出非图片的文件路径
//! - 摄像头：`gst://camera/dev/video0?width=640&height=480&fps=30`
//!
//! 管道末端统一转换为 RGB 并接入 `appsink`。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::{collections::HashMap, path::Path, time::Duration};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use super::{ReadError, descriptor::url_path};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FALLBACK_HEIGHT, FALLBACK_WIDTH, Frame, FrameShape, PixelLayout, RGB_CHANNELS},
};

/// 单次取帧的默认最长等待时间，可用 `timeout_ms` 查询参数覆盖
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(5);

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format")]
  UnsupportedFormat,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    format: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
    direction: u32,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        format,
        width,
        height,
        fps,
      } => {
        let io_mode_str = if let Some(mode) = io_mode {
          format!(" io-mode={}", mode)
        } else {
          "".to_string()
        };
        format!(
          "v4l2src device={}{} ! video/x-raw,format={},width={},height={},framerate={}/1",
          camera, io_mode_str, format, width, height, fps
        )
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method, direction } => {
        format!("videoflip method={} video-direction={}", method, direction)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
  pull_timeout: Duration,
}

impl GStreamerInputPipelineBuilder {
  /// 从视频文件读取
  pub fn file(path: &Path) -> Self {
    GStreamerInputPipelineBuilder {
      items: vec![
        GStreamerInputBuilderItem::FileSource(path.display().to_string()),
        GStreamerInputBuilderItem::TargetFormat {
          format: "RGB".to_string(),
        },
      ],
      pull_timeout: DEFAULT_PULL_TIMEOUT,
    }
  }

  pub fn with_pull_timeout(mut self, pull_timeout: Duration) -> Self {
    self.pull_timeout = pull_timeout;
    self
  }

  pub fn pull_timeout(&self) -> Duration {
    self.pull_timeout
  }

  fn pull_timeout_from(query: &HashMap<String, String>) -> Duration {
    query
      .get("timeout_ms")
      .and_then(|v| v.parse::<u64>().ok())
      .filter(|&ms| ms > 0)
      .map(Duration::from_millis)
      .unwrap_or(DEFAULT_PULL_TIMEOUT)
  }

  fn build_camera_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let camera = path.to_string();
    let io_mode = query.get("io-mode").and_then(|v| v.parse::<u32>().ok());
    let format = query
      .get("format")
      .map(String::from)
      .unwrap_or(String::from("YUY2"));
    let width = query
      .get("width")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(FALLBACK_WIDTH as u32);
    let height = query
      .get("height")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(FALLBACK_HEIGHT as u32);
    let fps = query
      .get("fps")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(15);

    let mut items = vec![GStreamerInputBuilderItem::CameraSource {
      camera,
      io_mode,
      format,
      width,
      height,
      fps,
    }];
    if let Some(video_flip) = Self::video_flip(query.get("rotate").map(|s| s.as_ref())) {
      items.push(video_flip);
    }

    GStreamerInputPipelineBuilder {
      items,
      pull_timeout: Self::pull_timeout_from(query),
    }
  }

  fn build_file_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let mut items = vec![GStreamerInputBuilderItem::FileSource(path.to_string())];
    if let Some(video_flip) = Self::video_flip(query.get("rotate").map(|s| s.as_ref())) {
      items.push(video_flip);
    }
    GStreamerInputPipelineBuilder {
      items,
      pull_timeout: Self::pull_timeout_from(query),
    }
  }

  fn video_flip(rotate: Option<&str>) -> Option<GStreamerInputBuilderItem> {
    let (method, direction) = match rotate? {
      "90" => (1, 1),
      "180" => (2, 2),
      "270" => (3, 3),
      _ => (0, 0),
    };
    Some(GStreamerInputBuilderItem::VideoFlip { method, direction })
  }

  pub fn describe(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink max-buffers=1 drop=true name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.describe();
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput {
      pipeline,
      appsink,
      pull_timeout: self.pull_timeout,
    })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let path = url_path(url).display().to_string();

    let mut builder = match url.host_str() {
      Some("camera") => Self::build_camera_pipeline(&path, &query),
      Some("file") => Self::build_file_pipeline(&path, &query),
      _ => {
        return Err(GStreamerInputError::SchemeMismatch);
      }
    };

    builder.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: "RGB".to_string(),
    });

    Ok(builder)
  }
}

/// GStreamer 视频输入，持有管道与 appsink
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  pull_timeout: Duration,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  pub fn next_frame(&mut self) -> Result<Frame, ReadError> {
    let timeout = gst::ClockTime::from_mseconds(self.pull_timeout.as_millis() as u64);
    match self.appsink.try_pull_sample(timeout) {
      Some(sample) => convert_sample(sample).map_err(|e| ReadError::Device(e.to_string())),
      None if self.appsink.is_eos() => Err(ReadError::EndOfStream),
      None => Err(ReadError::TimedOut(self.pull_timeout)),
    }
  }
}

fn convert_sample(sample: gst::Sample) -> Result<Frame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let row_bytes = width * RGB_CHANNELS;
  let expected_size = stride * (height.saturating_sub(1)) + row_bytes;
  if data.len() < expected_size {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: expected_size,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row_bytes * height);
  match video_info.format() {
    gst_video::VideoFormat::Rgb => {
      for h in 0..height {
        pixels.extend_from_slice(&data[h * stride..h * stride + row_bytes]);
      }
    }
    gst_video::VideoFormat::Bgr => {
      for h in 0..height {
        for px in data[h * stride..h * stride + row_bytes].chunks_exact(RGB_CHANNELS) {
          pixels.extend_from_slice(&[px[2], px[1], px[0]]);
        }
      }
    }
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  }

  Frame::new(FrameShape::rgb(width, height), PixelLayout::Nhwc, pixels)
    .map_err(|e| GStreamerInputError::PipelineError(e.to_string()))
}
