// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/model/placeholder.rs - 占位推理后端
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

use tracing::info;

use super::{BackendKind, BoundingBox, Detection, InferenceError, Label, ModelLoadError, ModelRuntime};
use crate::frame::Frame;

/// 占位框占帧宽高的比例 [x1, y1, x2, y2]
const PLACEHOLDER_BOX_RATIOS: [f64; 4] = [0.3, 0.3, 0.7, 0.7];
const PLACEHOLDER_SCORE: f32 = 0.9;
const PLACEHOLDER_LABEL_ID: u32 = 0;
const PLACEHOLDER_LABEL_NAME: &str = "object";

/// 不执行真实模型的运行时：对每一帧返回画面中央的一个固定比例框
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderRuntime;

/// 占位模型句柄，只记录模型路径
#[derive(Debug, Clone)]
pub struct PlaceholderModel {
  pub path: String,
}

impl ModelRuntime for PlaceholderRuntime {
  type Handle = PlaceholderModel;
  const KIND: BackendKind = BackendKind::Placeholder;

  fn load_model(&self, path: &str) -> Result<Self::Handle, ModelLoadError> {
    // 不读取文件，路径只用于日志
    info!("占位后端，不实际加载模型: {}", path);
    Ok(PlaceholderModel {
      path: path.to_string(),
    })
  }

  fn run_model(
    &self,
    _handle: &Self::Handle,
    frame: &Frame,
  ) -> Result<Vec<Detection>, InferenceError> {
    Ok(vec![Detection {
      bbox: BoundingBox::from_ratios(frame.shape(), PLACEHOLDER_BOX_RATIOS),
      score: PLACEHOLDER_SCORE,
      label: Label::new(PLACEHOLDER_LABEL_ID, PLACEHOLDER_LABEL_NAME),
    }])
  }

  fn release_model(&self, handle: Self::Handle) {
    info!("占位后端释放模型: {}", handle.path);
  }
}
