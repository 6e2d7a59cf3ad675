// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/bin/simple_continueshot.rs - 持续采集并推理
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use bianyuan::{
  config::{self, Args, PipelineConfig},
  output::OutputWrapper,
  task::{CancelToken, ContinuousTask, Task, ThreadedTask},
};

fn main() -> Result<()> {
  config::init_logging();

  let args = Args::parse();
  info!("输出路径: {}", args.output);

  let cancel = CancelToken::install_ctrlc()?;
  let mut pipeline = PipelineConfig::from(&args).build()?;
  let mut output = OutputWrapper::parse(&args.output)?;

  let summary = if args.threaded {
    ThreadedTask::default()
      .with_frame_number(args.frame_number)
      .with_cancel(cancel)
      .run_task(&mut pipeline, &mut output)?
  } else {
    ContinuousTask::default()
      .with_frame_number(args.frame_number)
      .with_interval(args.interval())
      .with_cancel(cancel)
      .run_task(&mut pipeline, &mut output)?
  };
  info!("成功 {} 步，失败 {} 步", summary.successes(), summary.failures);

  pipeline.cleanup();
  Ok(())
}
