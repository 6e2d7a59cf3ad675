// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/model.rs - 模型
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

use std::{fmt, str::FromStr, time::Duration};

use serde::Serialize;
use thiserror::Error;

use crate::frame::{Frame, FrameError, FrameShape};

mod engine;
mod placeholder;

pub use self::engine::{Engine, InferStats};
pub(crate) use self::engine::mean_duration;
pub use self::placeholder::{PlaceholderModel, PlaceholderRuntime};

#[cfg(feature = "model_yolo26")]
mod coco;
#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26Model, Yolo26Runtime};

/// 推理后端种类，调用方据此区分占位输出与真实模型输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  /// 固定比例框、固定标签，仅用于开发与测试
  Placeholder,
  /// RKNN NPU 上运行的 YOLO26
  Rknn,
}

impl BackendKind {
  pub fn is_placeholder(&self) -> bool {
    matches!(self, BackendKind::Placeholder)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      BackendKind::Placeholder => "placeholder",
      BackendKind::Rknn => "rknn",
    }
  }
}

impl fmt::Display for BackendKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BackendKind {
  type Err = ModelLoadError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "placeholder" | "fake" => Ok(BackendKind::Placeholder),
      "rknn" | "rknpu" => Ok(BackendKind::Rknn),
      other => Err(ModelLoadError::Unsupported(other.to_string())),
    }
  }
}

/// 像素坐标下的检测框 [x1, y1, x2, y2]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BoundingBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  /// 由相对于帧尺寸的比例构造，`ratios` 为 [x1, y1, x2, y2]
  pub fn from_ratios(shape: FrameShape, ratios: [f64; 4]) -> Self {
    let (w, h) = (shape.width as f64, shape.height as f64);
    Self {
      x1: (ratios[0] * w) as f32,
      y1: (ratios[1] * h) as f32,
      x2: (ratios[2] * w) as f32,
      y2: (ratios[3] * h) as f32,
    }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  /// 裁剪到 [0, width] x [0, height]，并保证 x1 <= x2、y1 <= y2
  pub fn clip(&self, shape: FrameShape) -> Self {
    let (w, h) = (shape.width as f32, shape.height as f32);
    let clamp = |v: f32, max: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, max) };

    let (x1, x2) = (clamp(self.x1, w), clamp(self.x2, w));
    let (y1, y2) = (clamp(self.y1, h), clamp(self.y2, h));

    Self {
      x1: x1.min(x2),
      y1: y1.min(y2),
      x2: x1.max(x2),
      y2: y1.max(y2),
    }
  }

  pub fn is_within(&self, shape: FrameShape) -> bool {
    let (w, h) = (shape.width as f32, shape.height as f32);
    0.0 <= self.x1
      && self.x1 <= self.x2
      && self.x2 <= w
      && 0.0 <= self.y1
      && self.y1 <= self.y2
      && self.y2 <= h
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Label {
  pub id: u32,
  pub name: String,
}

impl Label {
  pub fn new(id: u32, name: impl Into<String>) -> Self {
    Self {
      id,
      name: name.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub score: f32,
  pub label: Label,
}

impl Detection {
  /// 裁剪检测框并把分数限制在 [0, 1]
  pub fn clipped(self, shape: FrameShape) -> Self {
    let score = if self.score.is_nan() {
      0.0
    } else {
      self.score.clamp(0.0, 1.0)
    };
    Self {
      bbox: self.bbox.clip(shape),
      score,
      label: self.label,
    }
  }
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型文件不存在: {0}")]
  NotFound(String),
  #[error("模型加载错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  Invalid(String),
  #[error("不支持的推理后端: {0}")]
  Unsupported(String),
}

/// 运行时内部的执行错误
#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("推理执行失败: {0}")]
  Runtime(String),
  #[error("输入尺寸不匹配: 期望 {expected}, 实际 {actual}")]
  ShapeMismatch {
    expected: FrameShape,
    actual: FrameShape,
  },
}

#[derive(Error, Debug)]
pub enum InferError {
  #[error("模型尚未加载")]
  NotLoaded,
  #[error("输入帧无效: {0}")]
  InvalidFrame(#[from] FrameError),
  #[error(transparent)]
  Inference(#[from] InferenceError),
}

/// 模型运行时边界：加载模型、对一帧执行模型
pub trait ModelRuntime {
  type Handle;
  const KIND: BackendKind;

  fn load_model(&self, path: &str) -> Result<Self::Handle, ModelLoadError>;
  fn run_model(
    &self,
    handle: &Self::Handle,
    frame: &Frame,
  ) -> Result<Vec<Detection>, InferenceError>;

  /// 释放模型占用的资源，默认直接丢弃句柄
  fn release_model(&self, handle: Self::Handle) {
    drop(handle);
  }
}

/// 推理后端能力
pub trait InferenceBackend {
  fn kind(&self) -> BackendKind;
  /// 幂等
  fn load(&mut self) -> Result<(), ModelLoadError>;
  fn is_loaded(&self) -> bool;
  /// 未加载时返回 [`InferError::NotLoaded`]，不会编造检测结果
  fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, InferError>;
  /// 幂等
  fn unload(&mut self);
}

/// 按配置选择的推理后端
pub enum BackendWrapper {
  Placeholder(Engine<PlaceholderRuntime>),
  #[cfg(feature = "model_yolo26")]
  Rknn(Engine<Yolo26Runtime>),
}

impl BackendWrapper {
  pub fn new(kind: BackendKind, model_path: &str) -> Result<Self, ModelLoadError> {
    match kind {
      BackendKind::Placeholder => Ok(BackendWrapper::Placeholder(Engine::new(
        model_path,
        PlaceholderRuntime,
      ))),
      #[cfg(feature = "model_yolo26")]
      BackendKind::Rknn => Ok(BackendWrapper::Rknn(Engine::new(
        model_path,
        Yolo26Runtime,
      ))),
      #[cfg(not(feature = "model_yolo26"))]
      BackendKind::Rknn => Err(ModelLoadError::Unsupported(format!(
        "{} (需要启用 model_yolo26 特性)",
        kind
      ))),
    }
  }

  pub fn stats(&self) -> InferStats {
    match self {
      BackendWrapper::Placeholder(engine) => engine.stats(),
      #[cfg(feature = "model_yolo26")]
      BackendWrapper::Rknn(engine) => engine.stats(),
    }
  }

  pub fn average_latency(&self) -> Option<Duration> {
    self.stats().average()
  }
}

impl InferenceBackend for BackendWrapper {
  fn kind(&self) -> BackendKind {
    match self {
      BackendWrapper::Placeholder(engine) => engine.kind(),
      #[cfg(feature = "model_yolo26")]
      BackendWrapper::Rknn(engine) => engine.kind(),
    }
  }

  fn load(&mut self) -> Result<(), ModelLoadError> {
    match self {
      BackendWrapper::Placeholder(engine) => engine.load(),
      #[cfg(feature = "model_yolo26")]
      BackendWrapper::Rknn(engine) => engine.load(),
    }
  }

  fn is_loaded(&self) -> bool {
    match self {
      BackendWrapper::Placeholder(engine) => engine.is_loaded(),
      #[cfg(feature = "model_yolo26")]
      BackendWrapper::Rknn(engine) => engine.is_loaded(),
    }
  }

  fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, InferError> {
    match self {
      BackendWrapper::Placeholder(engine) => engine.infer(frame),
      #[cfg(feature = "model_yolo26")]
      BackendWrapper::Rknn(engine) => engine.infer(frame),
    }
  }

  fn unload(&mut self) {
    match self {
      BackendWrapper::Placeholder(engine) => engine.unload(),
      #[cfg(feature = "model_yolo26")]
      BackendWrapper::Rknn(engine) => engine.unload(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clip_clamps_and_orders() {
    let shape = FrameShape::rgb(100, 50);
    let bbox = BoundingBox::new(120.0, -5.0, 10.0, 80.0).clip(shape);
    assert_eq!(bbox, BoundingBox::new(10.0, 0.0, 100.0, 50.0));
    assert!(bbox.is_within(shape));
  }

  #[test]
  fn clip_handles_nan() {
    let bbox = BoundingBox::new(f32::NAN, 1.0, 2.0, f32::NAN).clip(FrameShape::rgb(4, 4));
    assert_eq!(bbox, BoundingBox::new(0.0, 0.0, 2.0, 1.0));
  }

  #[test]
  fn detection_score_is_clamped() {
    let detection = Detection {
      bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
      score: 1.7,
      label: Label::new(0, "object"),
    }
    .clipped(FrameShape::rgb(4, 4));
    assert_eq!(detection.score, 1.0);
  }

  #[test]
  fn backend_kind_parses() {
    assert_eq!("Placeholder".parse::<BackendKind>().unwrap(), BackendKind::Placeholder);
    assert_eq!("rknn".parse::<BackendKind>().unwrap(), BackendKind::Rknn);
    assert!("tensorrt".parse::<BackendKind>().is_err());
    assert!(BackendKind::Placeholder.is_placeholder());
    assert!(!BackendKind::Rknn.is_placeholder());
  }

  #[test]
  fn wrapper_reports_kind() {
    let backend = BackendWrapper::new(BackendKind::Placeholder, "models/fake_model.engine").unwrap();
    assert_eq!(backend.kind(), BackendKind::Placeholder);
    assert!(!backend.is_loaded());
  }

  #[cfg(not(feature = "model_yolo26"))]
  #[test]
  fn rknn_requires_feature() {
    assert!(matches!(
      BackendWrapper::new(BackendKind::Rknn, "model.rknn"),
      Err(ModelLoadError::Unsupported(_))
    ));
  }
}
