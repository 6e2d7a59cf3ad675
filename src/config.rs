// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/config.rs - 参数与配置
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

use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
  input::{Camera, SourcePolicy},
  model::{BackendKind, BackendWrapper, ModelLoadError},
  pipeline::Pipeline,
};

pub const ENV_CAMERA_SOURCE: &str = "BIANYUAN_CAMERA_SOURCE";
pub const ENV_MODEL_PATH: &str = "BIANYUAN_MODEL_PATH";
pub const ENV_BACKEND: &str = "BIANYUAN_BACKEND";

pub const DEFAULT_CAMERA_SOURCE: &str = "0";
pub const DEFAULT_MODEL_PATH: &str = "models/fake_model.engine";
pub const DEFAULT_OUTPUT: &str = "stdout:";

/// Bianyuan 命令行参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 视频源：设备序号（如 0）、文件路径，或 pattern:// image:// v4l:// gst:// 地址
  #[arg(long, env = ENV_CAMERA_SOURCE, default_value = DEFAULT_CAMERA_SOURCE, value_name = "SOURCE")]
  pub source: String,

  /// 模型文件路径
  #[arg(long, env = ENV_MODEL_PATH, default_value = DEFAULT_MODEL_PATH, value_name = "MODEL")]
  pub model: String,

  /// 推理后端
  #[arg(long, env = ENV_BACKEND, value_enum, default_value_t = BackendKind::Placeholder)]
  pub backend: BackendKind,

  /// 输出地址：stdout:、jsonl:///path 或 image:///path/frame_{index}.png
  #[arg(long, default_value = DEFAULT_OUTPUT, value_name = "OUTPUT")]
  pub output: String,

  /// 打开或读取失败时直接报错，不使用替代帧
  #[arg(long)]
  pub strict: bool,

  /// 最大处理帧数（不指定表示不限制）
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<u64>,

  /// 两帧之间的最小间隔（毫秒）
  #[arg(long, value_name = "MILLIS")]
  pub interval_ms: Option<u64>,

  /// 基准测试的重复次数
  #[arg(long, default_value_t = 1000, value_name = "TIMES")]
  pub repeat: usize,

  /// 采集与推理在两个线程中执行
  #[arg(long)]
  pub threaded: bool,
}

impl Args {
  pub fn interval(&self) -> Option<Duration> {
    self.interval_ms.map(Duration::from_millis)
  }
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无效的推理后端 {value:?}（环境变量 {var}）")]
  InvalidBackend { var: &'static str, value: String },
}

/// 构造流水线所需的全部配置
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub source: String,
  pub model_path: String,
  pub backend: BackendKind,
  pub policy: SourcePolicy,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      source: DEFAULT_CAMERA_SOURCE.to_string(),
      model_path: DEFAULT_MODEL_PATH.to_string(),
      backend: BackendKind::Placeholder,
      policy: SourcePolicy::default(),
    }
  }
}

impl From<&Args> for PipelineConfig {
  fn from(args: &Args) -> Self {
    Self {
      source: args.source.clone(),
      model_path: args.model.clone(),
      backend: args.backend,
      policy: if args.strict {
        SourcePolicy::strict()
      } else {
        SourcePolicy::default()
      },
    }
  }
}

impl PipelineConfig {
  /// 从环境变量读取，未设置的项使用默认值
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let mut config = Self::default();
    if let Some(source) = lookup(ENV_CAMERA_SOURCE) {
      config.source = source;
    }
    if let Some(model_path) = lookup(ENV_MODEL_PATH) {
      config.model_path = model_path;
    }
    if let Some(value) = lookup(ENV_BACKEND) {
      config.backend = value
        .parse()
        .map_err(|_| ConfigError::InvalidBackend {
          var: ENV_BACKEND,
          value,
        })?;
    }
    Ok(config)
  }

  pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
    self.policy = policy;
    self
  }

  /// 构造视频源与推理后端；模型在第一次执行时加载
  pub fn build(&self) -> Result<Pipeline<Camera, BackendWrapper>, ModelLoadError> {
    info!("视频源: {}", self.source);
    info!("模型文件路径: {} ({})", self.model_path, self.backend);

    let camera = Camera::new(&self.source).with_policy(self.policy);
    let backend = BackendWrapper::new(self.backend, &self.model_path)?;
    Ok(Pipeline::new(camera, backend))
  }
}

/// 安装日志输出，级别由 `RUST_LOG` 控制，默认 info；日志写到标准错误
pub fn init_logging() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}
