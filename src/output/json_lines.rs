// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// src/output/json_lines.rs - JSON 行输出
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
  fs::File,
  io::{BufWriter, Write},
};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, frame::Frame, input::url_path, output::Render,
  pipeline::PipelineResult,
};

pub(super) const STDOUT_SCHEME: &str = "stdout";

#[derive(Error, Debug)]
pub enum JsonLinesError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 每个结果写一行 JSON
pub struct JsonLinesOutput<W: Write> {
  writer: W,
}

impl<W: Write> JsonLinesOutput<W> {
  pub fn new(writer: W) -> Self {
    Self { writer }
  }

  pub fn into_inner(self) -> W {
    self.writer
  }
}

impl JsonLinesOutput<Box<dyn Write + Send>> {
  pub fn stdout() -> Self {
    Self::new(Box::new(std::io::stdout()))
  }

  pub fn create(path: &std::path::Path) -> Result<Self, JsonLinesError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    info!("检测结果写入文件: {}", path.display());
    Ok(Self::new(Box::new(BufWriter::new(file))))
  }
}

impl FromUrlWithScheme for JsonLinesOutput<Box<dyn Write + Send>> {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput<Box<dyn Write + Send>> {
  type Error = JsonLinesError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      STDOUT_SCHEME => Ok(Self::stdout()),
      Self::SCHEME => Self::create(&url_path(url)),
      other => Err(JsonLinesError::SchemeMismatch(format!(
        "期望输出方式 '{}' 或 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        STDOUT_SCHEME,
        other
      ))),
    }
  }
}

impl<W: Write> Render for JsonLinesOutput<W> {
  type Error = JsonLinesError;

  fn render_result(&mut self, result: &PipelineResult, _frame: Option<&Frame>) -> Result<(), Self::Error> {
    serde_json::to_writer(&mut self.writer, result)?;
    self.writer.write_all(b"\n")?;
    self.writer.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::{
    frame::FrameShape,
    model::{BackendKind, BoundingBox, Detection, Label},
  };

  fn result(index: u64) -> PipelineResult {
    PipelineResult {
      frame_index: index,
      timestamp_ms: 1_700_000_000_000,
      frame: FrameShape::rgb(100, 200),
      substituted: false,
      backend: BackendKind::Placeholder,
      detections: vec![Detection {
        bbox: BoundingBox::new(30.0, 60.0, 70.0, 140.0),
        score: 0.9,
        label: Label::new(0, "object"),
      }],
      elapsed: Duration::from_micros(1500),
    }
  }

  #[test]
  fn writes_one_line_per_result() {
    let mut output = JsonLinesOutput::new(Vec::new());
    output.render_result(&result(0), None).unwrap();
    output.render_result(&result(1), None).unwrap();

    let text = String::from_utf8(output.into_inner()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);

    let value: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(value["frame_index"], 1);
    assert_eq!(value["detections"][0]["label"]["name"], "object");
    assert_eq!(value["detections"][0]["bbox"]["x2"], 70.0);
    assert_eq!(value["elapsed_ms"], 1.5);
  }

  #[test]
  fn file_target_creates_parent_dirs() {
    let dir = std::env::temp_dir().join(format!("bianyuan-jsonl-{}", std::process::id()));
    let path = dir.join("nested").join("out.jsonl");
    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file:", "jsonl:", 1)).unwrap();

    let mut output = JsonLinesOutput::from_url(&url).unwrap();
    output.render_result(&result(7), None).unwrap();
    drop(output);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"frame_index\":7"));
    std::fs::remove_dir_all(&dir).ok();
  }
}
