// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{
  frame::{Frame, RGB_CHANNELS},
  model::Detection,
};

const PALETTE_SIZE: usize = 80;
const BORDER_THICKNESS: u32 = 2;

/// 把帧转换为 RGB 图像，非三通道的帧返回 `None`
pub fn frame_to_rgb_image(frame: &Frame) -> Option<RgbImage> {
  if frame.channels() != RGB_CHANNELS {
    return None;
  }
  let nhwc = frame.to_nhwc();
  RgbImage::from_raw(
    frame.width() as u32,
    frame.height() as u32,
    nhwc.as_bytes().to_vec(),
  )
}

/// 按类别着色绘制检测框
pub struct Draw {
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    // 每个类别一种颜色，色相均匀分布
    let colors = (0..PALETTE_SIZE)
      .map(|i| hsv_to_rgb((i as f32 / PALETTE_SIZE as f32) * 360.0, 0.8, 0.9))
      .collect();
    Self { colors }
  }
}

impl Draw {
  pub fn color_of(&self, label_id: u32) -> Rgb<u8> {
    self.colors[label_id as usize % self.colors.len()]
  }

  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 {
      return;
    }

    for detection in detections {
      let color = self.color_of(detection.label.id);
      let bbox = detection.bbox;

      let x = (bbox.x1.max(0.0).floor() as u32).min(w - 1);
      let y = (bbox.y1.max(0.0).floor() as u32).min(h - 1);
      let x2 = (bbox.x2.max(0.0).ceil() as u32).min(w);
      let y2 = (bbox.y2.max(0.0).ceil() as u32).min(h);

      for t in 0..BORDER_THICKNESS {
        let width = x2.saturating_sub(x).saturating_sub(2 * t);
        let height = y2.saturating_sub(y).saturating_sub(2 * t);
        if width == 0 || height == 0 {
          break;
        }
        let rect = Rect::at((x + t) as i32, (y + t) as i32).of_size(width, height);
        draw_hollow_rect_mut(image, rect, color);
      }
    }
  }

  /// 复制帧并绘制检测框
  pub fn draw_on_frame(&self, frame: &Frame, detections: &[Detection]) -> Option<RgbImage> {
    let mut image = frame_to_rgb_image(frame)?;
    self.draw_detections(&mut image, detections);
    Some(image)
  }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = match h {
    h if h < 60.0 => (c, x, 0.0),
    h if h < 120.0 => (x, c, 0.0),
    h if h < 180.0 => (0.0, c, x),
    h if h < 240.0 => (0.0, x, c),
    h if h < 300.0 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}
