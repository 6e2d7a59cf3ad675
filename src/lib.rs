// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/lib.rs - 库主文件
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

//! 边缘设备上的 “采集 → 推理 → 结果” 单步流水线。
//!
//! - [`input`]：帧来源（摄像头、图片、测试图样）及其打开/释放生命周期
//! - [`model`]：可替换的推理后端（占位后端与真实模型后端）
//! - [`pipeline`]：组合二者，执行单步并把各阶段错误归并为带阶段标签的错误
//! - [`task`]：单次、重复基准、连续循环以及双线程运行方式
//! - [`output`]：结果输出（JSON 行、标注图像）

pub mod config;
pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}
