// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// tests/common/mod.rs - 测试用的采集与模型后端
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

#![allow(dead_code)]

use std::{
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  thread,
  time::Duration,
};

use bianyuan::{
  frame::{Frame, FrameShape, PixelLayout},
  input::{Camera, CaptureBackend, ReadError, SourceDescriptor, SourceOpenError, SourcePolicy},
  model::{
    BackendKind, BoundingBox, Detection, Engine, InferenceError, Label, ModelLoadError, ModelRuntime,
  },
  output::Render,
  pipeline::PipelineResult,
};

#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
  pub fn bump(&self) -> usize {
    self.0.fetch_add(1, Ordering::SeqCst)
  }

  pub fn get(&self) -> usize {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, Default)]
pub struct CaptureCounters {
  pub open_attempts: Counter,
  pub opens: Counter,
  pub closes: Counter,
  pub reads: Counter,
}

impl CaptureCounters {
  /// 尚未关闭的句柄数
  pub fn live(&self) -> usize {
    self.opens.get() - self.closes.get()
  }
}

/// 可控的采集后端，按配置失败、结束或变慢
#[derive(Debug, Clone)]
pub struct MockCapture {
  pub counters: CaptureCounters,
  shape: FrameShape,
  fail_open: bool,
  fail_read: bool,
  read_timeout: Option<Duration>,
  frames_before_eos: Option<usize>,
  read_delay: Option<Duration>,
}

impl MockCapture {
  pub fn new(shape: FrameShape) -> Self {
    Self {
      counters: CaptureCounters::default(),
      shape,
      fail_open: false,
      fail_read: false,
      read_timeout: None,
      frames_before_eos: None,
      read_delay: None,
    }
  }

  pub fn failing_open(mut self) -> Self {
    self.fail_open = true;
    self
  }

  pub fn failing_read(mut self) -> Self {
    self.fail_read = true;
    self
  }

  /// 每次读取都报告等待 `after` 后超时
  pub fn timing_out(mut self, after: Duration) -> Self {
    self.read_timeout = Some(after);
    self
  }

  pub fn ending_after(mut self, frames: usize) -> Self {
    self.frames_before_eos = Some(frames);
    self
  }

  pub fn slow(mut self, delay: Duration) -> Self {
    self.read_delay = Some(delay);
    self
  }

  pub fn camera(self, policy: SourcePolicy) -> (Camera<MockCapture>, CaptureCounters) {
    let counters = self.counters.clone();
    (
      Camera::with_backend("mock-device", self).with_policy(policy),
      counters,
    )
  }
}

/// 每个句柄已读出的帧数
pub struct MockHandle {
  served: usize,
}

impl CaptureBackend for MockCapture {
  type Handle = MockHandle;

  fn open_source(&mut self, descriptor: &SourceDescriptor) -> Result<Self::Handle, SourceOpenError> {
    self.counters.open_attempts.bump();
    if self.fail_open {
      return Err(SourceOpenError::Unavailable {
        descriptor: descriptor.to_string(),
        reason: "mock device is unplugged".to_string(),
      });
    }
    self.counters.opens.bump();
    Ok(MockHandle { served: 0 })
  }

  fn read_one(&mut self, handle: &mut Self::Handle) -> Result<Frame, ReadError> {
    self.counters.reads.bump();
    if let Some(delay) = self.read_delay {
      thread::sleep(delay);
    }
    if self.fail_read {
      return Err(ReadError::Device("mock read failure".to_string()));
    }
    if let Some(after) = self.read_timeout {
      return Err(ReadError::TimedOut(after));
    }
    if let Some(limit) = self.frames_before_eos
      && handle.served >= limit
    {
      return Err(ReadError::EndOfStream);
    }
    handle.served += 1;
    let fill = (handle.served % 256) as u8;
    Ok(Frame::new(self.shape, PixelLayout::Nhwc, vec![fill; self.shape.byte_len().unwrap()]).unwrap())
  }

  fn close_source(&mut self, _handle: Self::Handle) {
    self.counters.closes.bump();
  }
}

#[derive(Debug, Clone, Default)]
pub struct ModelCounters {
  pub loads: Counter,
  pub releases: Counter,
  pub runs: Counter,
}

impl ModelCounters {
  pub fn live(&self) -> usize {
    self.loads.get() - self.releases.get()
  }
}

#[derive(Debug, Clone)]
pub struct MockRuntime {
  pub counters: ModelCounters,
  fail_load: bool,
  fail_every: Option<usize>,
  detections: Vec<Detection>,
}

impl Default for MockRuntime {
  fn default() -> Self {
    Self {
      counters: ModelCounters::default(),
      fail_load: false,
      fail_every: None,
      detections: vec![Detection {
        bbox: BoundingBox::new(1.0, 1.0, 2.0, 2.0),
        score: 0.5,
        label: Label::new(7, "mock"),
      }],
    }
  }
}

impl MockRuntime {
  pub fn failing_load(mut self) -> Self {
    self.fail_load = true;
    self
  }

  /// 每第 `n` 次推理失败
  pub fn failing_every(mut self, n: usize) -> Self {
    self.fail_every = Some(n);
    self
  }

  pub fn returning(mut self, detections: Vec<Detection>) -> Self {
    self.detections = detections;
    self
  }

  pub fn engine(self) -> (Engine<MockRuntime>, ModelCounters) {
    let counters = self.counters.clone();
    (Engine::new("mock.rknn", self), counters)
  }
}

pub struct MockModel;

impl ModelRuntime for MockRuntime {
  type Handle = MockModel;
  const KIND: BackendKind = BackendKind::Rknn;

  fn load_model(&self, path: &str) -> Result<Self::Handle, ModelLoadError> {
    if self.fail_load {
      return Err(ModelLoadError::NotFound(path.to_string()));
    }
    self.counters.loads.bump();
    Ok(MockModel)
  }

  fn run_model(&self, _handle: &Self::Handle, _frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
    let run = self.counters.runs.bump() + 1;
    if let Some(n) = self.fail_every
      && run % n == 0
    {
      return Err(InferenceError::Runtime(format!("mock failure on run {}", run)));
    }
    Ok(self.detections.clone())
  }

  fn release_model(&self, _handle: Self::Handle) {
    self.counters.releases.bump();
  }
}

/// 只记录收到的结果
#[derive(Debug, Default)]
pub struct CollectOutput {
  pub results: Vec<PipelineResult>,
  pub frames_seen: usize,
}

impl Render for CollectOutput {
  type Error = std::io::Error;

  fn render_result(&mut self, result: &PipelineResult, frame: Option<&Frame>) -> Result<(), Self::Error> {
    if frame.is_some() {
      self.frames_seen += 1;
    }
    self.results.push(result.clone());
    Ok(())
  }
}
