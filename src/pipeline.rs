// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/pipeline.rs - 采集与推理流水线
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

use std::{
  fmt,
  time::{Duration, Instant},
};

use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::{Frame, FrameError, FrameShape},
  input::{FrameSource, ReadError, SourceOpenError},
  model::{BackendKind, Detection, InferError, InferenceBackend, ModelLoadError},
};

/// 失败发生的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
  Capture,
  Inference,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Stage::Capture => f.write_str("capture"),
      Stage::Inference => f.write_str("inference"),
    }
  }
}

#[derive(Error, Debug)]
pub enum StageError {
  #[error("打开视频源失败: {0}")]
  SourceOpen(#[source] SourceOpenError),
  #[error("读取帧失败: {0}")]
  Read(#[source] ReadError),
  #[error("输入帧无效: {0}")]
  InvalidFrame(#[source] FrameError),
  #[error("模型加载失败: {0}")]
  ModelLoad(#[source] ModelLoadError),
  #[error("推理失败: {0}")]
  Inference(#[source] InferError),
}

/// 单步失败，带有失败阶段
#[derive(Error, Debug)]
#[error("[{stage}] {kind}")]
pub struct PipelineError {
  stage: Stage,
  #[source]
  kind: StageError,
}

impl PipelineError {
  pub fn capture(kind: StageError) -> Self {
    Self {
      stage: Stage::Capture,
      kind,
    }
  }

  pub fn inference(kind: StageError) -> Self {
    Self {
      stage: Stage::Inference,
      kind,
    }
  }

  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub fn kind(&self) -> &StageError {
    &self.kind
  }

  pub fn into_kind(self) -> StageError {
    self.kind
  }
}

fn serialize_elapsed<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_f64(elapsed.as_nanos() as f64 / 1_000_000.0)
}

/// 一次成功执行的结果，不保留像素数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
  pub frame_index: u64,
  pub timestamp_ms: i64,
  pub frame: FrameShape,
  pub substituted: bool,
  pub backend: BackendKind,
  pub detections: Vec<Detection>,
  #[serde(rename = "elapsed_ms", serialize_with = "serialize_elapsed")]
  pub elapsed: Duration,
}

/// 采集阶段的产物
#[derive(Debug)]
pub(crate) struct Captured {
  pub frame: Frame,
  pub substituted: bool,
  pub started: Instant,
}

pub(crate) fn capture_step<S: FrameSource>(source: &mut S) -> Result<Captured, PipelineError> {
  let started = Instant::now();

  source
    .open()
    .map_err(|e| PipelineError::capture(StageError::SourceOpen(e)))?;

  let frame = source.read().map_err(|e| match e {
    ReadError::Open(e) => PipelineError::capture(StageError::SourceOpen(e)),
    e => PipelineError::capture(StageError::Read(e)),
  })?;

  frame
    .validate()
    .map_err(|e| PipelineError::capture(StageError::InvalidFrame(e)))?;

  let substituted = source.last_read_substituted();
  if substituted {
    debug!("本次使用替代帧: {}", frame.shape());
  }

  Ok(Captured {
    frame,
    substituted,
    started,
  })
}

pub(crate) fn infer_step<B: InferenceBackend>(
  backend: &mut B,
  frame_index: u64,
  captured: &Captured,
) -> Result<PipelineResult, PipelineError> {
  backend
    .load()
    .map_err(|e| PipelineError::inference(StageError::ModelLoad(e)))?;

  let detections = backend
    .infer(&captured.frame)
    .map_err(|e| PipelineError::inference(StageError::Inference(e)))?;

  Ok(PipelineResult {
    frame_index,
    timestamp_ms: chrono::Utc::now().timestamp_millis(),
    frame: captured.frame.shape(),
    substituted: captured.substituted,
    backend: backend.kind(),
    detections,
    elapsed: captured.started.elapsed(),
  })
}

/// 采集 -> 推理 -> 结果
///
/// 单线程、同步执行；`Drop` 时释放视频源并卸载模型。
pub struct Pipeline<S: FrameSource, B: InferenceBackend> {
  source: S,
  backend: B,
  frame_count: u64,
}

impl<S: FrameSource, B: InferenceBackend> Pipeline<S, B> {
  pub fn new(source: S, backend: B) -> Self {
    Self {
      source,
      backend,
      frame_count: 0,
    }
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  /// 已尝试执行的步数
  pub fn frame_count(&self) -> u64 {
    self.frame_count
  }

  /// 分别借出视频源、推理后端与帧计数，供多线程任务使用
  pub(crate) fn parts_mut(&mut self) -> (&mut S, &mut B, &mut u64) {
    (&mut self.source, &mut self.backend, &mut self.frame_count)
  }

  pub(crate) fn next_index(&mut self) -> u64 {
    let index = self.frame_count;
    self.frame_count += 1;
    index
  }

  /// 执行一步，同时返回参与推理的帧供输出使用
  pub fn run_step(&mut self) -> Result<(PipelineResult, Frame), PipelineError> {
    let index = self.next_index();
    let captured = capture_step(&mut self.source)?;
    let result = infer_step(&mut self.backend, index, &captured)?;
    debug!(
      "第 {} 帧完成，耗时: {:.2?}，检测到 {} 个物体",
      index,
      result.elapsed,
      result.detections.len()
    );
    Ok((result, captured.frame))
  }

  pub fn run_once(&mut self) -> Result<PipelineResult, PipelineError> {
    self.run_step().map(|(result, _)| result)
  }

  /// 幂等
  pub fn cleanup(&mut self) {
    if self.source.state() != crate::input::SourceState::Closed || self.backend.is_loaded() {
      info!("释放流水线资源");
    }
    self.source.release();
    self.backend.unload();
  }
}

impl<S: FrameSource, B: InferenceBackend> Drop for Pipeline<S, B> {
  fn drop(&mut self) {
    self.cleanup();
  }
}
