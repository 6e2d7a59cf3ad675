// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/task.rs - 任务循环
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use tracing::{error, info, warn};

use crate::{
  input::FrameSource,
  model::{InferenceBackend, mean_duration},
  output::Render,
  pipeline::{Pipeline, PipelineResult},
};

mod threaded;
pub use self::threaded::{LatestFrameSlot, ThreadedTask};

/// 收到中断信号后等待多久强制退出
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);
/// 基准测试中不计入平均值的预热次数
const WARMUP_RUNS: usize = 2;
/// 等待下一帧间隔时检查取消标志的粒度
const CANCEL_POLL: Duration = Duration::from_millis(50);

pub trait Task<S: FrameSource, B: InferenceBackend, O: Render>: Sized {
  type Output;
  fn run_task(self, pipeline: &mut Pipeline<S, B>, output: &mut O) -> Result<Self::Output, anyhow::Error>;
}

/// 可在线程间共享的取消标志
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  /// 创建取消标志并绑定 Ctrl-C；收到信号 30 秒后仍未退出则强制结束进程
  pub fn install_ctrlc() -> Result<Self, ctrlc::Error> {
    let token = Self::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      handler_token.cancel();
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(token)
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  /// 睡眠至多 `duration`，被取消时提前返回 `true`
  pub fn sleep(&self, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
      if self.is_cancelled() {
        return true;
      }
      let now = Instant::now();
      if now >= deadline {
        return false;
      }
      thread::sleep((deadline - now).min(CANCEL_POLL));
    }
  }
}

/// 循环任务的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
  pub steps: u64,
  pub failures: u64,
}

impl LoopSummary {
  pub fn successes(&self) -> u64 {
    self.steps - self.failures
  }
}

pub struct OneShotTask;

impl<S, B, O> Task<S, B, O> for OneShotTask
where
  S: FrameSource,
  B: InferenceBackend,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = PipelineResult;

  fn run_task(self, pipeline: &mut Pipeline<S, B>, output: &mut O) -> Result<Self::Output, anyhow::Error> {
    info!("开始任务...");
    let (result, frame) = pipeline.run_step()?;
    info!(
      "推理完成，耗时: {:.2?}，检测到 {} 个物体",
      result.elapsed,
      result.detections.len()
    );
    output.render_result(&result, Some(&frame))?;
    info!("渲染完成");

    Ok(result)
  }
}

/// 基准测试结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatSummary {
  pub runs: usize,
  /// 去掉预热次数后的平均耗时
  pub average: Option<Duration>,
}

/// 重复执行若干步并统计平均耗时
#[derive(Debug, Clone, Copy)]
pub struct RepeatShotTask {
  pub times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn new(times: usize) -> Self {
    Self { times }
  }
}

fn average_after_warmup(times: &[Duration]) -> Option<Duration> {
  let warmup = if times.len() > WARMUP_RUNS { WARMUP_RUNS } else { 0 };
  let measured = &times[warmup..];
  if measured.is_empty() {
    return None;
  }
  let total = measured.iter().sum::<Duration>();
  Some(mean_duration(total, measured.len() as u64))
}

impl<S, B, O> Task<S, B, O> for RepeatShotTask
where
  S: FrameSource,
  B: InferenceBackend,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = RepeatSummary;

  fn run_task(self, pipeline: &mut Pipeline<S, B>, output: &mut O) -> Result<Self::Output, anyhow::Error> {
    info!("开始任务，重复 {} 次...", self.times);
    let mut times = Vec::with_capacity(self.times);
    for i in 0..self.times {
      let (result, frame) = pipeline.run_step()?;
      info!("({})推理完成，耗时: {:.2?}", i, result.elapsed);
      output.render_result(&result, Some(&frame))?;
      times.push(result.elapsed);
    }

    let average = average_after_warmup(&times);
    if let Some(average) = average {
      warn!("平均耗时: {:.2?}", average);
    }

    Ok(RepeatSummary {
      runs: times.len(),
      average,
    })
  }
}

/// 持续执行，单步失败只记录不退出
#[derive(Debug, Clone, Default)]
pub struct ContinuousTask {
  frame_number: Option<u64>,
  interval: Option<Duration>,
  cancel: CancelToken,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
    self.interval = interval;
    self
  }

  pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
    self.cancel = cancel;
    self
  }
}

impl<S, B, O> Task<S, B, O> for ContinuousTask
where
  S: FrameSource,
  B: InferenceBackend,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = LoopSummary;

  fn run_task(self, pipeline: &mut Pipeline<S, B>, output: &mut O) -> Result<Self::Output, anyhow::Error> {
    info!("开始任务...");
    let mut summary = LoopSummary::default();

    loop {
      if self.cancel.is_cancelled() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if let Some(limit) = self.frame_number
        && summary.steps >= limit
      {
        info!("达到指定帧数 {}, 退出任务循环", limit);
        break;
      }

      let now = Instant::now();
      summary.steps += 1;
      match pipeline.run_step() {
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

      if let Some(interval) = self.interval
        && self.cancel.sleep(interval.saturating_sub(now.elapsed()))
      {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!(
      "任务完成，共 {} 步，失败 {} 步",
      summary.steps, summary.failures
    );
    Ok(summary)
  }
}
