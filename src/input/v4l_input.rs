// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/input/v4l_input.rs - V4L 视频输入
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

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;
use v4l::{
  FourCC,
  buffer::Type,
  io::{mmap::Stream, traits::CaptureStream},
  video::Capture,
};

use super::{ReadError, descriptor::url_path};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameShape, PixelLayout, RGB_CHANNELS},
};

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
}

const V4L_BUFFER_COUNT: u32 = 4;
const FOURCC_RGB3: &[u8; 4] = b"RGB3";
const FOURCC_YUYV: &[u8; 4] = b"YUYV";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
  Rgb3,
  Yuyv,
}

/// V4L2 摄像头输入，使用内存映射缓冲区连续取帧
pub struct V4lInput {
  stream: Stream<'static>,
  format: PixelFormat,
  width: usize,
  height: usize,
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemaMismatch);
    }

    // v4l:///dev/video0
    let path = url_path(url);
    if path.as_os_str().is_empty() || path == Path::new("/") {
      return Self::open_index(0);
    }
    Self::open_path(&path)
  }
}

impl V4lInput {
  pub fn open_index(index: usize) -> Result<Self, V4lInputError> {
    info!("打开 V4L2 设备 #{}", index);
    Self::configure(v4l::Device::new(index)?)
  }

  pub fn open_path(path: &Path) -> Result<Self, V4lInputError> {
    info!("打开 V4L2 设备 {}", path.display());
    Self::configure(v4l::Device::with_path(path)?)
  }

  fn configure(device: v4l::Device) -> Result<Self, V4lInputError> {
    // 优先 RGB3，不支持时退回 YUYV
    let mut format = device.format()?;
    format.fourcc = FourCC::new(FOURCC_RGB3);
    let mut format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(FOURCC_RGB3) {
      format.fourcc = FourCC::new(FOURCC_YUYV);
      format = device.set_format(&format)?;
    }

    let pixel_format = if format.fourcc == FourCC::new(FOURCC_RGB3) {
      PixelFormat::Rgb3
    } else if format.fourcc == FourCC::new(FOURCC_YUYV) {
      PixelFormat::Yuyv
    } else {
      return Err(V4lInputError::UnsupportedPixelFormat(
        format.fourcc.to_string(),
      ));
    };

    debug!(
      "V4L2 格式: {}x{} {}",
      format.width, format.height, format.fourcc
    );

    let stream = Stream::with_buffers(&device, Type::VideoCapture, V4L_BUFFER_COUNT)?;

    Ok(V4lInput {
      stream,
      format: pixel_format,
      width: format.width as usize,
      height: format.height as usize,
    })
  }

  pub fn next_frame(&mut self) -> Result<Frame, ReadError> {
    let (buf, meta) = self
      .stream
      .next()
      .map_err(|e| ReadError::Device(e.to_string()))?;
    debug!("V4L2 取帧: 序号 {}, {} 字节", meta.sequence, buf.len());

    let shape = FrameShape::rgb(self.width, self.height);
    let data = match self.format {
      PixelFormat::Rgb3 => {
        let expected = shape.checked_byte_len()?;
        if buf.len() < expected {
          return Err(ReadError::Device(format!(
            "Captured buffer size mismatch: expected {}, got {}",
            expected,
            buf.len()
          )));
        }
        buf[..expected].to_vec()
      }
      PixelFormat::Yuyv => yuyv_to_rgb(buf, self.width, self.height)?,
    };

    Ok(Frame::new(shape, PixelLayout::Nhwc, data)?)
  }
}

/// YUYV 4:2:2 转 RGB24（BT.601）
fn yuyv_to_rgb(buf: &[u8], width: usize, height: usize) -> Result<Vec<u8>, ReadError> {
  let expected = width * height * 2;
  if buf.len() < expected {
    return Err(ReadError::Device(format!(
      "Captured buffer size mismatch: expected {}, got {}",
      expected,
      buf.len()
    )));
  }

  let mut rgb = Vec::with_capacity(width * height * RGB_CHANNELS);
  for chunk in buf[..expected].chunks_exact(4) {
    let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
    rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
    rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
  }
  Ok(rgb)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
  let c = y as i32 - 16;
  let d = u as i32 - 128;
  let e = v as i32 - 128;
  let r = (298 * c + 409 * e + 128) >> 8;
  let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
  let b = (298 * c + 516 * d + 128) >> 8;
  [
    r.clamp(0, 255) as u8,
    g.clamp(0, 255) as u8,
    b.clamp(0, 255) as u8,
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_grey_stays_grey() {
    // Y=128, U=V=128 为中灰
    let buf = [128u8, 128, 128, 128];
    let rgb = yuyv_to_rgb(&buf, 2, 1).unwrap();
    assert_eq!(rgb.len(), 6);
    assert!(rgb.iter().all(|&v| v == rgb[0]));
  }

  #[test]
  fn yuyv_short_buffer_is_an_error() {
    assert!(yuyv_to_rgb(&[0u8; 6], 2, 2).is_err());
  }

  #[test]
  fn black_and_white_limits() {
    assert_eq!(yuv_to_rgb(16, 128, 128), [0, 0, 0]);
    assert_eq!(yuv_to_rgb(235, 128, 128), [255, 255, 255]);
  }
}
