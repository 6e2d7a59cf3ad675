// 该文件是 Bianyuan （边缘计算套件） 项目的一部分。
// tests/pipeline.rs - 流水线单步执行与资源释放
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

mod common;

use std::time::Duration;

use bianyuan::{
  config::PipelineConfig,
  frame::FrameShape,
  input::{Camera, FrameSource, ReadError, SourcePolicy, SourceState},
  model::{BackendKind, Engine, InferError, InferenceBackend, PlaceholderRuntime},
  pipeline::{Pipeline, Stage, StageError},
};
use common::{MockCapture, MockRuntime};

#[test]
fn repeated_steps_keep_frame_shape() {
  let (camera, _) = MockCapture::new(FrameShape::rgb(96, 64)).camera(SourcePolicy::default());
  let mut pipeline = Pipeline::new(camera, Engine::new("unused", PlaceholderRuntime));

  let shapes: Vec<FrameShape> = (0..5).map(|_| pipeline.run_once().unwrap().frame).collect();
  assert!(shapes.iter().all(|s| *s == FrameShape::rgb(96, 64)));
  assert_eq!(pipeline.frame_count(), 5);
}

#[cfg(feature = "read_image_file")]
#[test]
fn static_image_source_keeps_frame_shape() {
  let dir = std::env::temp_dir().join(format!("bianyuan-static-{}", std::process::id()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("still.png");
  image::RgbImage::from_pixel(50, 30, image::Rgb([10, 20, 30]))
    .save(&path)
    .unwrap();

  let config = PipelineConfig {
    source: path.display().to_string(),
    ..PipelineConfig::default()
  };
  let mut pipeline = config.build().unwrap();

  let first = pipeline.run_once().unwrap();
  let second = pipeline.run_once().unwrap();
  assert_eq!(first.frame, FrameShape::rgb(50, 30));
  assert_eq!(first.frame, second.frame);
  assert_eq!(first.detections, second.detections);
  assert_eq!(second.frame_index, 1);

  drop(pipeline);
  std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn cleanup_without_running_is_safe() {
  let (camera, capture) = MockCapture::new(FrameShape::rgb(8, 8)).camera(SourcePolicy::default());
  let (engine, model) = MockRuntime::default().engine();
  let mut pipeline = Pipeline::new(camera, engine);

  pipeline.cleanup();
  drop(pipeline);
  assert_eq!(capture.opens.get(), 0);
  assert_eq!(capture.closes.get(), 0);
  assert_eq!(model.loads.get(), 0);
  assert_eq!(model.releases.get(), 0);
}

#[test]
fn cleanup_many_times_releases_once() {
  let (camera, capture) = MockCapture::new(FrameShape::rgb(8, 8)).camera(SourcePolicy::default());
  let (engine, model) = MockRuntime::default().engine();
  let mut pipeline = Pipeline::new(camera, engine);

  pipeline.run_once().unwrap();
  assert_eq!(capture.live(), 1);
  assert_eq!(model.live(), 1);

  for _ in 0..3 {
    pipeline.cleanup();
  }
  assert_eq!(pipeline.source().state(), SourceState::Closed);
  assert!(!pipeline.backend().is_loaded());

  drop(pipeline);
  assert_eq!(capture.opens.get(), 1);
  assert_eq!(capture.closes.get(), 1);
  assert_eq!(model.loads.get(), 1);
  assert_eq!(model.releases.get(), 1);
}

#[test]
fn drop_without_cleanup_releases_everything() {
  let (camera, capture) = MockCapture::new(FrameShape::rgb(8, 8)).camera(SourcePolicy::default());
  let (engine, model) = MockRuntime::default().engine();
  {
    let mut pipeline = Pipeline::new(camera, engine);
    pipeline.run_once().unwrap();
    pipeline.run_once().unwrap();
  }
  assert_eq!(capture.live(), 0);
  assert_eq!(model.live(), 0);
}

#[test]
fn strict_open_failure_is_a_capture_error() {
  let (camera, _) = MockCapture::new(FrameShape::rgb(8, 8))
    .failing_open()
    .camera(SourcePolicy::strict());
  let (engine, model) = MockRuntime::default().engine();
  let mut pipeline = Pipeline::new(camera, engine);

  for _ in 0..2 {
    let err = pipeline.run_once().unwrap_err();
    assert_eq!(err.stage(), Stage::Capture);
    assert!(matches!(err.kind(), StageError::SourceOpen(_)));
  }
  // 采集失败时不会加载模型
  assert_eq!(model.loads.get(), 0);
}

#[test]
fn strict_read_failure_is_a_capture_error() {
  let (camera, _) = MockCapture::new(FrameShape::rgb(8, 8))
    .failing_read()
    .camera(SourcePolicy::strict());
  let mut pipeline = Pipeline::new(camera, Engine::new("unused", PlaceholderRuntime));

  let err = pipeline.run_once().unwrap_err();
  assert_eq!(err.stage(), Stage::Capture);
  assert!(matches!(err.kind(), StageError::Read(ReadError::Device(_))));
}

#[test]
fn substituted_frame_still_reaches_inference() {
  let (camera, _) = MockCapture::new(FrameShape::rgb(8, 8))
    .failing_open()
    .camera(SourcePolicy::default());
  let mut pipeline = Pipeline::new(camera, Engine::new("unused", PlaceholderRuntime));

  let result = pipeline.run_once().unwrap();
  assert!(result.substituted);
  assert_eq!(result.frame, FrameShape::rgb(640, 480));
  assert_eq!(result.backend, BackendKind::Placeholder);
  assert_eq!(result.detections.len(), 1);
}

#[test]
fn degraded_step_tries_to_open_once() {
  let (camera, capture) = MockCapture::new(FrameShape::rgb(8, 8))
    .failing_open()
    .camera(SourcePolicy::default());
  let mut pipeline = Pipeline::new(camera, Engine::new("unused", PlaceholderRuntime));

  for step in 1..=3 {
    assert!(pipeline.run_once().unwrap().substituted);
    assert_eq!(capture.open_attempts.get(), step);
  }
}

#[test]
fn malformed_frame_is_rejected_at_capture() {
  for shape in [
    FrameShape::new(0, 8, 3),
    FrameShape::new(8, 0, 3),
    FrameShape::new(8, 8, 0),
  ] {
    let (camera, _) = MockCapture::new(shape).camera(SourcePolicy::default());
    let (engine, model) = MockRuntime::default().engine();
    let mut pipeline = Pipeline::new(camera, engine);

    let err = pipeline.run_once().unwrap_err();
    assert_eq!(err.stage(), Stage::Capture);
    assert!(matches!(err.kind(), StageError::InvalidFrame(_)));
    assert_eq!(model.loads.get(), 0);
    assert_eq!(model.runs.get(), 0);
  }
}

#[test]
fn read_timeout_is_a_capture_error() {
  let (camera, _) = MockCapture::new(FrameShape::rgb(8, 8))
    .timing_out(Duration::from_millis(250))
    .camera(SourcePolicy::default());
  let (engine, model) = MockRuntime::default().engine();
  let mut pipeline = Pipeline::new(camera, engine);

  let err = pipeline.run_once().unwrap_err();
  assert_eq!(err.stage(), Stage::Capture);
  assert!(matches!(err.kind(), StageError::Read(ReadError::TimedOut(_))));
  assert_eq!(model.loads.get(), 0);
}

#[test]
fn model_load_failure_is_an_inference_error() {
  let (camera, _) = MockCapture::new(FrameShape::rgb(8, 8)).camera(SourcePolicy::default());
  let (engine, _) = MockRuntime::default().failing_load().engine();
  let mut pipeline = Pipeline::new(camera, engine);

  let err = pipeline.run_once().unwrap_err();
  assert_eq!(err.stage(), Stage::Inference);
  assert!(matches!(err.kind(), StageError::ModelLoad(_)));
}

#[test]
fn inference_failure_is_tagged_and_not_empty() {
  let (camera, _) = MockCapture::new(FrameShape::rgb(8, 8)).camera(SourcePolicy::default());
  let (engine, _) = MockRuntime::default().failing_every(2).engine();
  let mut pipeline = Pipeline::new(camera, engine);

  assert_eq!(pipeline.run_once().unwrap().detections.len(), 1);
  let err = pipeline.run_once().unwrap_err();
  assert_eq!(err.stage(), Stage::Inference);
  assert!(matches!(
    err.kind(),
    StageError::Inference(InferError::Inference(_))
  ));
  assert!(err.to_string().starts_with("[inference]"));
  assert_eq!(pipeline.run_once().unwrap().detections.len(), 1);
}

#[test]
fn camera_can_be_built_from_config() {
  let config = PipelineConfig {
    source: "pattern://?width=16&height=8".to_string(),
    ..PipelineConfig::default()
  };
  let mut pipeline = config.build().unwrap();
  let result = pipeline.run_once().unwrap();
  assert_eq!(result.frame, FrameShape::rgb(16, 8));
  assert!(result.backend.is_placeholder());

  let _: &Camera = pipeline.source();
}
