// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/task/threaded.rs - 采集与推理分线程执行
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
  sync::{Condvar, Mutex, MutexGuard, PoisonError},
  thread,
  time::Duration,
};

use tracing::{debug, error, info, warn};

use super::{CancelToken, LoopSummary, Task};
use crate::{
  input::{FrameSource, ReadError},
  model::InferenceBackend,
  output::Render,
  pipeline::{Pipeline, StageError, capture_step, infer_step},
};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// 采集失败后重试前的等待
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

struct SlotState<T> {
  value: Option<T>,
  closed: bool,
  dropped: u64,
}

/// 深度为 1 的交接槽：新值覆盖未被取走的旧值
pub struct LatestFrameSlot<T> {
  state: Mutex<SlotState<T>>,
  ready: Condvar,
}

impl<T> Default for LatestFrameSlot<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> LatestFrameSlot<T> {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(SlotState {
        value: None,
        closed: false,
        dropped: 0,
      }),
      ready: Condvar::new(),
    }
  }

  fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 放入新值；已关闭时丢弃并返回 `false`
  pub fn put(&self, value: T) -> bool {
    let mut state = self.lock();
    if state.closed {
      return false;
    }
    if state.value.replace(value).is_some() {
      state.dropped += 1;
    }
    drop(state);
    self.ready.notify_one();
    true
  }

  /// 等待至多 `timeout` 取出一个值；关闭且为空时返回 `Ok(None)`
  pub fn take(&self, timeout: Duration) -> Result<Option<T>, ReadError> {
    let state = self.lock();
    let (mut state, wait) = self
      .ready
      .wait_timeout_while(state, timeout, |s| s.value.is_none() && !s.closed)
      .unwrap_or_else(PoisonError::into_inner);

    match state.value.take() {
      Some(value) => Ok(Some(value)),
      None if state.closed => Ok(None),
      None if wait.timed_out() => Err(ReadError::TimedOut(timeout)),
      None => Ok(None),
    }
  }

  pub fn close(&self) {
    self.lock().closed = true;
    self.ready.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    self.lock().closed
  }

  /// 被覆盖而未处理的值的数量
  pub fn dropped(&self) -> u64 {
    self.lock().dropped
  }
}

/// 采集线程与推理线程通过 [`LatestFrameSlot`] 交接帧
///
/// 推理总是处理最新的帧，处理不过来的帧被丢弃。取消或达到帧数后两边各自释放资源。
#[derive(Debug, Clone)]
pub struct ThreadedTask {
  frame_number: Option<u64>,
  read_timeout: Duration,
  cancel: CancelToken,
}

impl Default for ThreadedTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      read_timeout: DEFAULT_READ_TIMEOUT,
      cancel: CancelToken::default(),
    }
  }
}

impl ThreadedTask {
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
    self.read_timeout = read_timeout;
    self
  }

  pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
    self.cancel = cancel;
    self
  }
}

impl<S, B, O> Task<S, B, O> for ThreadedTask
where
  S: FrameSource + Send,
  B: InferenceBackend,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = LoopSummary;

  fn run_task(self, pipeline: &mut Pipeline<S, B>, output: &mut O) -> Result<Self::Output, anyhow::Error> {
    info!("开始任务（采集与推理分线程）...");
    let slot = LatestFrameSlot::new();
    let (source, backend, frame_count) = pipeline.parts_mut();
    let cancel = &self.cancel;
    let mut summary = LoopSummary::default();

    thread::scope(|scope| {
      let slot = &slot;
      let capture = scope.spawn(move || {
        while !slot.is_closed() && !cancel.is_cancelled() {
          match capture_step(source) {
            Ok(captured) => {
              slot.put(Ok(captured));
            }
            Err(e) => {
              let end = matches!(e.kind(), StageError::Read(ReadError::EndOfStream));
              slot.put(Err(e));
              if end {
                info!("视频源结束，停止采集");
                break;
              }
              cancel.sleep(CAPTURE_RETRY_DELAY);
            }
          }
        }
        source.release();
        slot.close();
        debug!("采集线程退出");
      });

      loop {
        if cancel.is_cancelled() {
          warn!("中断信号接收，退出任务循环");
          break;
        }
        if let Some(limit) = self.frame_number
          && summary.steps >= limit
        {
          info!("达到指定帧数 {}, 退出任务循环", limit);
          break;
        }

        let captured = match slot.take(self.read_timeout) {
          Ok(Some(captured)) => captured,
          Ok(None) => break,
          Err(e) => {
            warn!("等待帧失败: {}", e);
            summary.steps += 1;
            summary.failures += 1;
            continue;
          }
        };

        summary.steps += 1;
        let index = *frame_count;
        *frame_count += 1;

        let step = captured.and_then(|captured| {
          infer_step(backend, index, &captured).map(|result| (result, captured.frame))
        });
        match step {
          Ok((result, frame)) => {
            info!(
              "第 {} 帧推理完成，耗时: {:.2?}，检测到 {} 个物体",
              result.frame_index,
              result.elapsed,
              result.detections.len()
            );
            if let Err(e) = output.render_result(&result, Some(&frame)) {
              error!("第 {} 帧输出失败: {}", result.frame_index, e);
              summary.failures += 1;
            }
          }
          Err(e) => {
            error!("第 {} 步失败: {}", summary.steps, e);
            summary.failures += 1;
          }
        }
      }

      slot.close();
      backend.unload();
      capture
        .join()
        .map_err(|_| anyhow::anyhow!("采集线程异常退出"))
    })?;

    info!(
      "任务完成，共 {} 步，失败 {} 步，丢弃 {} 帧",
      summary.steps,
      summary.failures,
      slot.dropped()
    );
    Ok(summary)
  }
}
