// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/input/camera.rs - 摄像头帧来源
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

use tracing::{debug, info, warn};

use super::{
  CaptureBackend, CaptureWrapper, FailurePolicy, FrameSource, ReadError, SourceDescriptor,
  SourceOpenError, SourcePolicy, SourceState,
};
use crate::frame::Frame;

/// 持有一个采集句柄的帧来源
///
/// 状态机：`Closed --open()--> Open --release()--> Closed`。
/// 在替代帧策略下打开失败会进入 `Degraded`，此后每次读取都会重新尝试打开，
/// 打开成功之前返回全零的替代帧。读取超时总是作为错误返回。句柄在 `Drop` 时释放。
pub struct Camera<B: CaptureBackend = CaptureWrapper> {
  descriptor: SourceDescriptor,
  backend: B,
  policy: SourcePolicy,
  handle: Option<B::Handle>,
  degraded: bool,
  /// 最近一次 open 失败且之后还没有读取，下一次 read 不再重复打开
  retry_pending: bool,
  substituted: bool,
}

impl Camera<CaptureWrapper> {
  pub fn new(source: &str) -> Self {
    Self::with_backend(source, CaptureWrapper)
  }
}

impl<B: CaptureBackend> Camera<B> {
  pub fn with_backend(source: &str, backend: B) -> Self {
    Self {
      descriptor: SourceDescriptor::parse(source),
      backend,
      policy: SourcePolicy::default(),
      handle: None,
      degraded: false,
      retry_pending: false,
      substituted: false,
    }
  }

  pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn descriptor(&self) -> &SourceDescriptor {
    &self.descriptor
  }

  pub fn policy(&self) -> &SourcePolicy {
    &self.policy
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  fn substitute(&mut self, cause: &ReadError) -> Frame {
    if self.degraded {
      debug!("视频源不可用，返回替代帧: {}", cause);
    } else {
      warn!("读取帧失败，返回替代帧: {}", cause);
    }
    self.substituted = true;
    self.policy.fallback_frame()
  }
}

impl<B: CaptureBackend> FrameSource for Camera<B> {
  fn open(&mut self) -> Result<(), SourceOpenError> {
    if self.handle.is_some() {
      return Ok(());
    }

    match self.backend.open_source(&self.descriptor) {
      Ok(handle) => {
        info!("视频源已打开: {}", self.descriptor);
        self.handle = Some(handle);
        self.degraded = false;
        self.retry_pending = false;
        Ok(())
      }
      Err(e) => match self.policy.on_failure {
        FailurePolicy::SubstituteFrame => {
          if !self.degraded {
            warn!("无法打开视频源 {}，将使用替代帧: {}", self.descriptor, e);
          }
          self.degraded = true;
          self.retry_pending = true;
          Ok(())
        }
        FailurePolicy::Strict => Err(e),
      },
    }
  }

  fn read(&mut self) -> Result<Frame, ReadError> {
    if self.handle.is_none() && !std::mem::take(&mut self.retry_pending) {
      if !self.policy.auto_open_on_read {
        self.substituted = false;
        return Err(ReadError::NotOpen);
      }
      if let Err(e) = self.open() {
        self.substituted = false;
        return Err(ReadError::Open(e));
      }
      self.retry_pending = false;
    }

    let outcome = match self.handle.as_mut() {
      Some(handle) => self.backend.read_one(handle),
      None => Err(ReadError::NotOpen),
    };

    match outcome {
      Ok(frame) => {
        self.substituted = false;
        Ok(frame)
      }
      // 超时与“无数据”区分开，任何策略下都不替代
      Err(e @ ReadError::TimedOut(_)) => {
        warn!("读取帧超时: {}", self.descriptor);
        self.substituted = false;
        Err(e)
      }
      Err(e) => match self.policy.on_failure {
        FailurePolicy::SubstituteFrame => Ok(self.substitute(&e)),
        FailurePolicy::Strict => {
          self.substituted = false;
          Err(e)
        }
      },
    }
  }

  fn release(&mut self) {
    if let Some(handle) = self.handle.take() {
      self.backend.close_source(handle);
      info!("视频源已释放: {}", self.descriptor);
    }
    self.degraded = false;
    self.retry_pending = false;
  }

  fn state(&self) -> SourceState {
    if self.handle.is_some() {
      SourceState::Open
    } else if self.degraded {
      SourceState::Degraded
    } else {
      SourceState::Closed
    }
  }

  fn last_read_substituted(&self) -> bool {
    self.substituted
  }
}

impl<B: CaptureBackend> Drop for Camera<B> {
  fn drop(&mut self) {
    self.release();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::FrameShape;

  #[test]
  fn pattern_source_opens_on_read() {
    let mut camera = Camera::new("pattern://?width=8&height=6");
    assert_eq!(camera.state(), SourceState::Closed);

    let frame = camera.read().unwrap();
    assert_eq!(frame.shape(), FrameShape::rgb(8, 6));
    assert_eq!(camera.state(), SourceState::Open);
    assert!(!camera.last_read_substituted());

    camera.release();
    assert_eq!(camera.state(), SourceState::Closed);
  }

  #[test]
  fn missing_file_degrades_to_fallback_frame() {
    let mut camera = Camera::new("/nonexistent/clip.mkv");
    camera.open().unwrap();
    assert_eq!(camera.state(), SourceState::Degraded);

    for _ in 0..3 {
      let frame = camera.read().unwrap();
      assert_eq!(frame.shape(), FrameShape::rgb(640, 480));
      assert!(frame.as_bytes().iter().all(|&b| b == 0));
      assert!(camera.last_read_substituted());
    }
  }

  #[test]
  fn explicit_open_is_not_repeated_by_next_read() {
    let mut camera = Camera::new("/nonexistent/clip.mkv");
    camera.open().unwrap();
    assert!(camera.retry_pending);

    camera.read().unwrap();
    assert!(!camera.retry_pending);
    assert_eq!(camera.state(), SourceState::Degraded);
  }
}
