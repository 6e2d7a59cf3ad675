// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/input/descriptor.rs - 视频源描述符
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
  convert::Infallible,
  fmt,
  path::{Path, PathBuf},
  str::FromStr,
};

use url::Url;

/// 能直接按 URL 解析的输入方案
const KNOWN_SCHEMES: [&str; 4] = ["pattern", "image", "v4l", "gst"];

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// 视频源描述符
///
/// - 纯数字字符串（如 `"0"`）表示本地设备序号
/// - 已知方案的 URL（`pattern://`、`image://`、`v4l://`、`gst://`）
/// - 其余一律视为文件路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
  Device(u32),
  Url(Url),
  Path(PathBuf),
}

impl SourceDescriptor {
  pub fn parse(source: &str) -> Self {
    let source = source.trim();

    if let Ok(index) = source.parse::<u32>() {
      return SourceDescriptor::Device(index);
    }

    if let Ok(url) = Url::parse(source)
      && KNOWN_SCHEMES.contains(&url.scheme())
    {
      return SourceDescriptor::Url(url);
    }

    SourceDescriptor::Path(PathBuf::from(source))
  }
}

impl FromStr for SourceDescriptor {
  type Err = Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self::parse(s))
  }
}

impl fmt::Display for SourceDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourceDescriptor::Device(index) => write!(f, "device#{}", index),
      SourceDescriptor::Url(url) => write!(f, "{}", url),
      SourceDescriptor::Path(path) => write!(f, "{}", path.display()),
    }
  }
}

/// URL 路径部分，按百分号编码解码
pub(crate) fn url_path(url: &Url) -> PathBuf {
  let raw = url.path();
  match urlencoding::decode(raw) {
    Ok(decoded) => PathBuf::from(decoded.into_owned()),
    Err(_) => PathBuf::from(raw),
  }
}

pub(crate) fn is_image_path(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      let ext = ext.to_lowercase();
      IMAGE_EXTENSIONS.contains(&ext.as_str())
    })
    .unwrap_or(false)
}
