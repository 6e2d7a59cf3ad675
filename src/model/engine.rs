// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/model/engine.rs - 推理引擎
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
  cell::Cell,
  time::{Duration, Instant},
};

use tracing::{debug, info};

use super::{BackendKind, Detection, InferError, InferenceBackend, ModelLoadError, ModelRuntime};
use crate::frame::Frame;

/// 推理计时
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferStats {
  pub runs: u64,
  pub total: Duration,
  pub last: Duration,
}

impl InferStats {
  pub fn average(&self) -> Option<Duration> {
    if self.runs == 0 {
      return None;
    }
    Some(mean_duration(self.total, self.runs))
  }
}

/// `total / count`，在 u128 纳秒上计算，不会因计数截断而除零
pub(crate) fn mean_duration(total: Duration, count: u64) -> Duration {
  let nanos = total.as_nanos() / u128::from(count.max(1));
  Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// 在某个模型运行时之上实现 [`InferenceBackend`]
///
/// 负责 加载/卸载 状态、输入帧检查，以及把运行时输出裁剪到帧范围内。
/// 后端种类由运行时类型决定，`Engine<PlaceholderRuntime>` 与真实模型的引擎是不同的类型。
pub struct Engine<R: ModelRuntime> {
  model_path: String,
  runtime: R,
  model: Option<R::Handle>,
  stats: Cell<InferStats>,
}

impl<R: ModelRuntime> Engine<R> {
  pub fn new(model_path: impl Into<String>, runtime: R) -> Self {
    Self {
      model_path: model_path.into(),
      runtime,
      model: None,
      stats: Cell::new(InferStats::default()),
    }
  }

  pub fn model_path(&self) -> &str {
    &self.model_path
  }

  pub fn runtime(&self) -> &R {
    &self.runtime
  }

  pub fn stats(&self) -> InferStats {
    self.stats.get()
  }

  fn record(&self, elapsed: Duration) {
    let mut stats = self.stats.get();
    stats.runs += 1;
    stats.total += elapsed;
    stats.last = elapsed;
    self.stats.set(stats);
  }
}

impl<R: ModelRuntime> InferenceBackend for Engine<R> {
  fn kind(&self) -> BackendKind {
    R::KIND
  }

  fn load(&mut self) -> Result<(), ModelLoadError> {
    if self.model.is_some() {
      return Ok(());
    }

    info!("加载模型 ({}): {}", R::KIND, self.model_path);
    let handle = self.runtime.load_model(&self.model_path)?;
    self.model = Some(handle);
    info!("模型加载完成");
    Ok(())
  }

  fn is_loaded(&self) -> bool {
    self.model.is_some()
  }

  fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, InferError> {
    let model = self.model.as_ref().ok_or(InferError::NotLoaded)?;
    frame.validate()?;

    let now = Instant::now();
    let detections = self.runtime.run_model(model, frame)?;
    let elapsed = now.elapsed();
    self.record(elapsed);
    debug!("推理完成，耗时: {:.2?}，检测到 {} 个物体", elapsed, detections.len());

    let shape = frame.shape();
    Ok(
      detections
        .into_iter()
        .map(|detection| detection.clipped(shape))
        .collect(),
    )
  }

  fn unload(&mut self) {
    if let Some(handle) = self.model.take() {
      self.runtime.release_model(handle);
      info!("模型已卸载: {}", self.model_path);
    }
  }
}

impl<R: ModelRuntime> Drop for Engine<R> {
  fn drop(&mut self) {
    self.unload();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn average_of_empty_stats() {
    assert_eq!(InferStats::default().average(), None);
  }

  #[test]
  fn average_divides_total() {
    let stats = InferStats {
      runs: 4,
      total: Duration::from_millis(40),
      last: Duration::from_millis(12),
    };
    assert_eq!(stats.average(), Some(Duration::from_millis(10)));
  }

  #[test]
  fn average_survives_huge_run_counts() {
    let stats = InferStats {
      runs: 1 << 32,
      total: Duration::from_secs(1 << 32),
      last: Duration::from_secs(1),
    };
    assert_eq!(stats.average(), Some(Duration::from_secs(1)));
  }
}
