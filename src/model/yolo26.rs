// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/model/yolo26.rs - RKNN YOLO26 运行时
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

use std::path::Path;

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};

use super::{
  BackendKind, BoundingBox, Detection, InferenceError, ModelLoadError, ModelRuntime,
  coco::{COCO_CLASS_NUM, coco_label},
};
use crate::frame::{Frame, FrameShape};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_INPUT_W: usize = 640;
const YOLO26_INPUT_H: usize = 640;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
const YOLO26_OBJECT_THRESH: f32 = 0.5;

/// 归一化坐标的检测结果，[x_min, y_min, x_max, y_max] 均在 [0, 1]
#[derive(Debug, Clone, PartialEq)]
struct NormalizedItem {
  class_id: u32,
  score: f32,
  bbox: [f32; 4],
}

/// 在 RKNN NPU 上执行 YOLO26 的运行时
#[derive(Debug, Default, Clone, Copy)]
pub struct Yolo26Runtime;

impl Yolo26Runtime {
  pub fn input_shape() -> FrameShape {
    FrameShape::rgb(YOLO26_INPUT_W, YOLO26_INPUT_H)
  }
}

pub struct Yolo26Model {
  context: Context,
}

fn invalid(msg: &str, e: rknpu::Error) -> ModelLoadError {
  ModelLoadError::Invalid(format!("{}: {}", msg, e))
}

impl ModelRuntime for Yolo26Runtime {
  type Handle = Yolo26Model;
  const KIND: BackendKind = BackendKind::Rknn;

  fn load_model(&self, path: &str) -> Result<Self::Handle, ModelLoadError> {
    if !Path::new(path).exists() {
      return Err(ModelLoadError::NotFound(path.to_string()));
    }

    info!("加载模型文件: {}", path);
    let mode_data = std::fs::read(path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      mode_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context =
      Context::new(&mode_data, InitFlags::default()).map_err(|e| invalid("无法创建推理上下文", e))?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| invalid("无法获取输出数量", e))?;

    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(ModelLoadError::Invalid(msg));
    }

    Ok(Yolo26Model { context })
  }

  fn run_model(
    &self,
    handle: &Self::Handle,
    frame: &Frame,
  ) -> Result<Vec<Detection>, InferenceError> {
    let expected = Self::input_shape();
    if frame.shape() != expected {
      return Err(InferenceError::ShapeMismatch {
        expected,
        actual: frame.shape(),
      });
    }

    let runtime_err = |e: rknpu::Error| InferenceError::Runtime(e.to_string());
    let input = frame.to_nhwc();

    debug!("设置模型输入");
    handle
      .context
      .set_input(0, input.as_bytes(), TensorFormat::NHWC, TensorType::UInt8)
      .map_err(runtime_err)?;

    debug!("执行模型推理");
    handle.context.run().map_err(runtime_err)?;

    let output = handle.context.get_outputs().map_err(runtime_err)?;
    let mut heads = Vec::with_capacity(YOLO26_NUM_OUTPUTS as usize);
    for idx in 0..YOLO26_NUM_OUTPUTS as usize {
      heads.push(output.get_f32(idx).map_err(runtime_err)?.to_vec());
    }

    let items = postprocess(&heads)?;
    debug!("检测到 {} 个物体", items.len());

    let (w, h) = (frame.width() as f32, frame.height() as f32);
    Ok(
      items
        .into_iter()
        .map(|item| Detection {
          bbox: BoundingBox::new(
            item.bbox[0] * w,
            item.bbox[1] * h,
            item.bbox[2] * w,
            item.bbox[3] * h,
          ),
          score: item.score,
          label: coco_label(item.class_id),
        })
        .collect(),
    )
  }
}

/// 根据张量大小匹配回归和分类输出，返回 (reg, cls)
fn match_reg_cls_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if tensor1.len() == reg_expected && tensor2.len() == cls_expected {
    Some((tensor1, tensor2))
  } else if tensor1.len() == cls_expected && tensor2.len() == reg_expected {
    Some((tensor2, tensor1))
  } else {
    None
  }
}

/// 解码三个检测头；任何一个头的输出大小不符都视为推理失败
fn postprocess(heads: &[Vec<f32>]) -> Result<Vec<NormalizedItem>, InferenceError> {
  let (input_w, input_h) = (YOLO26_INPUT_W as f32, YOLO26_INPUT_H as f32);
  let mut items = Vec::new();

  for (head_idx, (&(map_h, map_w), stride)) in
    YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
  {
    let spatial = map_h * map_w;
    let reg_expected = 4 * spatial;
    let cls_expected = COCO_CLASS_NUM * spatial;

    // RKNN 的输出顺序不固定，按张量大小区分回归与分类
    let (tensor1, tensor2) = match (heads.get(head_idx * 2), heads.get(head_idx * 2 + 1)) {
      (Some(a), Some(b)) => (a.as_slice(), b.as_slice()),
      _ => {
        return Err(InferenceError::Runtime(format!(
          "检测头 {} 缺少输出张量",
          head_idx
        )));
      }
    };

    let (reg, cls) = match_reg_cls_tensors(tensor1, tensor2, reg_expected, cls_expected)
      .ok_or_else(|| {
        InferenceError::Runtime(format!(
          "检测头 {}: 输出大小不匹配 - 张量1: {}, 张量2: {}, 期望回归: {}, 期望分类: {}",
          head_idx,
          tensor1.len(),
          tensor2.len(),
          reg_expected,
          cls_expected
        ))
      })?;

    for h in 0..map_h {
      for w in 0..map_w {
        let idx = h * map_w + w;

        let (score, class_id) = {
          let mut max_logit = f32::MIN;
          let mut cls_idx = 0usize;
          for c in 0..COCO_CLASS_NUM {
            let logit = cls[c * spatial + idx];
            if logit > max_logit {
              max_logit = logit;
              cls_idx = c;
            }
          }
          (sigmoid(max_logit), cls_idx as u32)
        };

        if score <= YOLO26_OBJECT_THRESH {
          continue;
        }

        let grid_x = (w as f32) + 0.5;
        let grid_y = (h as f32) + 0.5;

        let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, input_w);
        let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, input_h);
        let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, input_w);
        let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, input_h);

        items.push(NormalizedItem {
          class_id,
          score,
          bbox: [
            xmin / input_w,
            ymin / input_h,
            xmax / input_w,
            ymax / input_h,
          ],
        });
      }
    }
  }

  Ok(items)
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn empty_heads() -> Vec<Vec<f32>> {
    let mut heads = Vec::new();
    for &(h, w) in YOLO26_HEAD_SIZES.iter() {
      heads.push(vec![0.0; 4 * h * w]);
      heads.push(vec![-10.0; COCO_CLASS_NUM * h * w]);
    }
    heads
  }

  #[test]
  fn low_scores_yield_nothing() {
    assert!(postprocess(&empty_heads()).unwrap().is_empty());
  }

  #[test]
  fn one_confident_cell_is_decoded() {
    let mut heads = empty_heads();
    // 第三个检测头（20x20, stride 32）的 (0, 0) 位置，类别 2
    let spatial = 20 * 20;
    heads[5][2 * spatial] = 5.0;
    for k in 0..4 {
      heads[4][k * spatial] = 0.5;
    }

    let items = postprocess(&heads).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 2);
    assert_eq!(items[0].bbox, [0.0, 0.0, 32.0 / 640.0, 32.0 / 640.0]);
  }

  #[test]
  fn swapped_outputs_are_matched() {
    let mut heads = empty_heads();
    heads.swap(0, 1);
    assert!(postprocess(&heads).is_ok());
  }

  #[test]
  fn wrong_sizes_fail() {
    let mut heads = empty_heads();
    heads[2].truncate(10);
    assert!(postprocess(&heads).is_err());
  }
}
