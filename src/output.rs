// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/output.rs - 输出定义
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

use std::io::Write;

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, pipeline::PipelineResult};

/// 结果输出
pub trait Render {
  type Error;
  /// `frame` 为参与推理的帧，部分调用方不保留帧时为 `None`
  fn render_result(&mut self, result: &PipelineResult, frame: Option<&Frame>) -> Result<(), Self::Error>;
}

mod json_lines;
pub use self::json_lines::{JsonLinesError, JsonLinesOutput};

#[cfg(feature = "save_image_file")]
pub mod draw;
#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON 行输出错误: {0}")]
  JsonLinesError(#[from] JsonLinesError),
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("无效的输出地址: {0}")]
  UrlError(#[from] url::ParseError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  JsonLines(JsonLinesOutput<Box<dyn Write + Send>>),
  #[cfg(feature = "save_image_file")]
  SaveImageFile(SaveImageFileOutput),
}

impl OutputWrapper {
  pub fn parse(target: &str) -> Result<Self, OutputError> {
    let url = Url::parse(target)?;
    Self::from_url(&url)
  }
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonLinesOutput::<Box<dyn Write + Send>>::SCHEME | json_lines::STDOUT_SCHEME => {
        Ok(OutputWrapper::JsonLines(JsonLinesOutput::from_url(url)?))
      }
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFile(
        SaveImageFileOutput::from_url(url)?,
      )),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&mut self, result: &PipelineResult, frame: Option<&Frame>) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonLines(output) => output
        .render_result(result, frame)
        .map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFile(output) => output
        .render_result(result, frame)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stdout_target_selects_json_lines() {
    assert!(matches!(
      OutputWrapper::parse("stdout:"),
      Ok(OutputWrapper::JsonLines(_))
    ));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    assert!(matches!(
      OutputWrapper::parse("rtsp://localhost/live"),
      Err(OutputError::SchemeMismatch(_))
    ));
  }

  #[cfg(feature = "save_image_file")]
  #[test]
  fn image_target_selects_image_output() {
    assert!(matches!(
      OutputWrapper::parse("image:///tmp/bianyuan/frame.png"),
      Ok(OutputWrapper::SaveImageFile(_))
    ));
  }
}
