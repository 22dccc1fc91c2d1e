// 该文件是 BINtrack 项目的一部分。
// src/model/bin_detector.rs - 垃圾桶检测流水线
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 BINtrack contributors

use std::path::PathBuf;

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{MODEL_INPUT_H, MODEL_INPUT_W, PreprocessError, preprocess},
  input::{ImageSource, Submission},
  model::{DetectionResult, InferenceBackend, InferenceError, Model, OnnxBackend, decode},
  url_path,
};

/// 逐框过滤与整体判定共用的置信度阈值
pub const BIN_CONFIDENCE_THRESHOLD: f32 = 0.2;
/// 返回给调用方的最大检测数
pub const MAX_DETECTIONS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  pub confidence_threshold: f32,
  pub max_detections: usize,
  pub input_width: u32,
  pub input_height: u32,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    DetectorConfig {
      confidence_threshold: BIN_CONFIDENCE_THRESHOLD,
      max_detections: MAX_DETECTIONS,
      input_width: MODEL_INPUT_W,
      input_height: MODEL_INPUT_H,
    }
  }
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("推理错误: {0}")]
  Inference(#[from] InferenceError),
}

/// 垃圾桶检测器：预处理 -> 推理 -> 解码 -> 判定。
///
/// 由应用的组装入口显式构造一次，之后以引用传递；自身不含可变状态，可并发调用。
pub struct BinDetector<B = OnnxBackend> {
  backend: B,
  config: DetectorConfig,
}

impl<B: InferenceBackend> BinDetector<B> {
  pub fn with_backend(backend: B, config: DetectorConfig) -> Self {
    BinDetector { backend, config }
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  pub fn try_detect_image(&self, image: &DynamicImage) -> Result<DetectionResult, DetectError> {
    let frame = preprocess(image, self.config.input_width, self.config.input_height)?;
    let raw = self.backend.infer(&frame)?;
    let detections = decode(&raw, image.width(), image.height(), &self.config);
    let result = DetectionResult::from_detections(detections, self.config.confidence_threshold);

    debug!(
      "检测完成: is_bin={}, 检测数={}, 最高置信度={:.3}",
      result.is_bin,
      result.detections.len(),
      result.highest_confidence
    );

    Ok(result)
  }

  pub fn try_detect(&self, source: &ImageSource) -> Result<DetectionResult, DetectError> {
    let image = source.load()?;
    self.try_detect_image(&image)
  }

  /// 任何环节失败都返回“未检测到垃圾桶，置信度 0”，错误只记录日志
  pub fn detect_bin(&self, source: &ImageSource) -> DetectionResult {
    fail_closed(self.try_detect(source))
  }

  pub fn detect_bin_image(&self, image: &DynamicImage) -> DetectionResult {
    fail_closed(self.try_detect_image(image))
  }
}

fn fail_closed(result: Result<DetectionResult, DetectError>) -> DetectionResult {
  result.unwrap_or_else(|e| {
    error!("垃圾桶检测失败，按未检测到处理: {}", e);
    DetectionResult::negative()
  })
}

impl<B: InferenceBackend> Model for BinDetector<B> {
  type Input = Submission;
  type Output = DetectionResult;
  type Error = DetectError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("检测提交: {}", input.name);
    self.try_detect(&input.source)
  }
}

#[derive(Error, Debug)]
pub enum BinDetectorBuilderError {
  #[error("模型路径必须使用 {0} 方案")]
  SchemeMismatch(String),
  #[error("模型路径为空")]
  EmptyPath,
  #[error("参数 {key} 的值无效: {value}")]
  InvalidParameter { key: String, value: String },
}

impl BinDetectorBuilderError {
  fn invalid(key: &str, value: &str) -> Self {
    BinDetectorBuilderError::InvalidParameter {
      key: key.to_string(),
      value: value.to_string(),
    }
  }
}

/// 从 `onnx:///path/model.onnx?threshold=0.2&max_detections=20&threads=4` 构造检测器
pub struct BinDetectorBuilder {
  model_path: PathBuf,
  config: DetectorConfig,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for BinDetectorBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for BinDetectorBuilder {
  type Error = BinDetectorBuilderError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(BinDetectorBuilderError::SchemeMismatch(
        Self::SCHEME.to_string(),
      ));
    }

    let model_path = url_path(url);
    if model_path.as_os_str().is_empty() || model_path.as_os_str() == "/" {
      return Err(BinDetectorBuilderError::EmptyPath);
    }

    let mut builder = BinDetectorBuilder::new(model_path);
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "threshold" => {
          let threshold: f32 = value
            .parse()
            .map_err(|_| BinDetectorBuilderError::invalid(&key, &value))?;
          builder = builder.confidence_threshold(threshold)?;
        }
        "max_detections" => {
          let max: usize = value
            .parse()
            .map_err(|_| BinDetectorBuilderError::invalid(&key, &value))?;
          builder = builder.max_detections(max)?;
        }
        "threads" => {
          let threads: usize = value
            .parse()
            .ok()
            .filter(|&t| t > 0)
            .ok_or_else(|| BinDetectorBuilderError::invalid(&key, &value))?;
          builder = builder.intra_threads(threads);
        }
        _ => debug!("忽略未知参数: {}={}", key, value),
      }
    }

    Ok(builder)
  }
}

impl BinDetectorBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    BinDetectorBuilder {
      model_path: model_path.into(),
      config: DetectorConfig::default(),
      intra_threads: None,
    }
  }

  pub fn confidence_threshold(mut self, threshold: f32) -> Result<Self, BinDetectorBuilderError> {
    if !(0.0..=1.0).contains(&threshold) {
      return Err(BinDetectorBuilderError::invalid(
        "threshold",
        &threshold.to_string(),
      ));
    }
    self.config.confidence_threshold = threshold;
    Ok(self)
  }

  pub fn max_detections(mut self, max: usize) -> Result<Self, BinDetectorBuilderError> {
    if max == 0 {
      return Err(BinDetectorBuilderError::invalid("max_detections", "0"));
    }
    self.config.max_detections = max;
    Ok(self)
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = Some(threads);
    self
  }

  pub fn model_path(&self) -> &std::path::Path {
    &self.model_path
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn build(self) -> Result<BinDetector<OnnxBackend>, InferenceError> {
    info!(
      "创建垃圾桶检测器: 阈值 {}, 最大检测数 {}",
      self.config.confidence_threshold, self.config.max_detections
    );
    let backend = OnnxBackend::load(&self.model_path, self.intra_threads)?;
    Ok(BinDetector::with_backend(backend, self.config))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use image::{Rgba, RgbaImage};

  use super::*;
  use crate::{frame::PlanarFrame, model::RawOutput};

  /// 返回固定输出并记录收到的输入形状
  struct FixedBackend {
    output: RawOutput,
    seen_shapes: Mutex<Vec<[usize; 4]>>,
  }

  impl FixedBackend {
    fn new(boxes: &[(f32, f32, f32, f32, f32)]) -> Self {
      let n = boxes.len();
      let mut data = vec![0f32; 5 * n];
      for (i, b) in boxes.iter().enumerate() {
        for (c, v) in [b.0, b.1, b.2, b.3, b.4].into_iter().enumerate() {
          data[c * n + i] = v;
        }
      }
      FixedBackend {
        output: RawOutput::new(vec![1, 5, n], data),
        seen_shapes: Mutex::new(Vec::new()),
      }
    }
  }

  impl InferenceBackend for FixedBackend {
    fn infer(&self, frame: &PlanarFrame) -> Result<RawOutput, InferenceError> {
      self.seen_shapes.lock().unwrap().push(frame.shape());
      Ok(self.output.clone())
    }
  }

  struct FailingBackend;

  impl InferenceBackend for FailingBackend {
    fn infer(&self, _frame: &PlanarFrame) -> Result<RawOutput, InferenceError> {
      Err(InferenceError::ModelInvalid("测试用失败".to_string()))
    }
  }

  fn photo(width: u32, height: u32) -> ImageSource {
    ImageSource::from(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
      width,
      height,
      Rgba([90, 120, 60, 255]),
    )))
  }

  #[test]
  fn single_box_is_a_bin() {
    let detector = BinDetector::with_backend(
      FixedBackend::new(&[(0.5, 0.5, 0.2, 0.2, 0.5)]),
      DetectorConfig::default(),
    );
    let result = detector.detect_bin(&photo(100, 100));

    assert!(result.is_bin);
    assert_eq!(result.highest_confidence, 0.5);
    assert_eq!(result.detections.len(), 1);
    let bbox = result.detections[0].bbox;
    for (got, want) in bbox.iter().zip([40.0, 40.0, 20.0, 20.0]) {
      assert!((got - want).abs() < 1e-4);
    }
  }

  #[test]
  fn backend_always_sees_model_shape() {
    let detector = BinDetector::with_backend(FixedBackend::new(&[]), DetectorConfig::default());
    detector.detect_bin(&photo(1920, 1080));
    detector.detect_bin(&photo(3, 7));
    assert_eq!(
      *detector.backend().seen_shapes.lock().unwrap(),
      vec![[1, 3, 640, 640], [1, 3, 640, 640]]
    );
  }

  #[test]
  fn low_confidence_is_not_a_bin() {
    let detector = BinDetector::with_backend(
      FixedBackend::new(&[(0.5, 0.5, 0.2, 0.2, 0.1), (0.3, 0.3, 0.1, 0.1, 0.15)]),
      DetectorConfig::default(),
    );
    assert_eq!(detector.detect_bin(&photo(64, 64)), DetectionResult::negative());
  }

  #[test]
  fn boundary_box_is_returned_but_not_a_bin() {
    let detector = BinDetector::with_backend(
      FixedBackend::new(&[(0.5, 0.5, 0.2, 0.2, 0.2)]),
      DetectorConfig::default(),
    );
    let result = detector.detect_bin(&photo(64, 64));
    assert!(!result.is_bin);
    assert_eq!(result.detections.len(), 1);
    assert_eq!(result.highest_confidence, 0.2);
  }

  #[test]
  fn inference_failure_is_fail_closed() {
    let detector = BinDetector::with_backend(FailingBackend, DetectorConfig::default());
    assert_eq!(detector.detect_bin(&photo(64, 64)), DetectionResult::negative());
    assert!(matches!(
      detector.try_detect(&photo(64, 64)),
      Err(DetectError::Inference(_))
    ));
  }

  #[test]
  fn undecodable_image_is_fail_closed() {
    let detector = BinDetector::with_backend(
      FixedBackend::new(&[(0.5, 0.5, 0.2, 0.2, 0.9)]),
      DetectorConfig::default(),
    );
    let source = ImageSource::from(b"\x89PNG broken".to_vec());
    assert_eq!(detector.detect_bin(&source), DetectionResult::negative());
    assert!(matches!(
      detector.try_detect(&source),
      Err(DetectError::Preprocess(_))
    ));
    assert!(detector.backend().seen_shapes.lock().unwrap().is_empty());
  }

  #[test]
  fn unrecognised_output_is_not_a_bin() {
    struct WrongShape;
    impl InferenceBackend for WrongShape {
      fn infer(&self, _frame: &PlanarFrame) -> Result<RawOutput, InferenceError> {
        Ok(RawOutput::new(vec![1, 84, 2], vec![0.9; 168]))
      }
    }

    let detector = BinDetector::with_backend(WrongShape, DetectorConfig::default());
    let result = detector.try_detect(&photo(32, 32)).unwrap();
    assert_eq!(result, DetectionResult::negative());
  }

  #[test]
  fn repeated_calls_are_identical() {
    let detector = BinDetector::with_backend(
      FixedBackend::new(&[(0.4, 0.6, 0.3, 0.2, 0.7), (0.5, 0.5, 0.1, 0.1, 0.35)]),
      DetectorConfig::default(),
    );
    let image = photo(300, 200);
    assert_eq!(detector.detect_bin(&image), detector.detect_bin(&image));
  }

  #[test]
  fn model_trait_detects_submissions() {
    let detector = BinDetector::with_backend(
      FixedBackend::new(&[(0.5, 0.5, 0.2, 0.2, 0.5)]),
      DetectorConfig::default(),
    );
    let good = Submission {
      name: "good".to_string(),
      source: photo(64, 64),
    };
    assert!(detector.infer(&good).unwrap().is_bin);

    let missing = Submission::from_path(PathBuf::from("/definitely/not/here.jpg"));
    assert!(detector.infer(&missing).is_err());
    assert_eq!(detector.infer_or_default(&missing), DetectionResult::negative());
  }

  #[test]
  fn custom_threshold_drives_both_checks() {
    let config = DetectorConfig {
      confidence_threshold: 0.6,
      ..DetectorConfig::default()
    };
    let detector = BinDetector::with_backend(
      FixedBackend::new(&[(0.5, 0.5, 0.2, 0.2, 0.5), (0.5, 0.5, 0.2, 0.2, 0.6)]),
      config,
    );
    let result = detector.detect_bin(&photo(10, 10));
    assert_eq!(result.detections.len(), 1);
    assert!(!result.is_bin);
  }

  #[test]
  fn builder_reads_query_parameters() {
    let url = Url::parse("onnx:///models/bin.onnx?threshold=0.35&max_detections=5&threads=2")
      .unwrap();
    let builder = BinDetectorBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path(), std::path::Path::new("/models/bin.onnx"));
    assert_eq!(builder.config().confidence_threshold, 0.35);
    assert_eq!(builder.config().max_detections, 5);
    assert_eq!(builder.intra_threads, Some(2));
  }

  #[test]
  fn builder_defaults_match_constants() {
    let url = Url::parse("onnx:///models/bin.onnx").unwrap();
    let builder = BinDetectorBuilder::from_url(&url).unwrap();
    assert_eq!(builder.config(), &DetectorConfig::default());
    assert_eq!(builder.config().confidence_threshold, BIN_CONFIDENCE_THRESHOLD);
    assert_eq!(builder.config().max_detections, MAX_DETECTIONS);
  }

  #[test]
  fn builder_rejects_bad_urls() {
    let cases = [
      "rknn:///models/bin.rknn",
      "onnx:///models/bin.onnx?threshold=1.5",
      "onnx:///models/bin.onnx?threshold=abc",
      "onnx:///models/bin.onnx?max_detections=0",
      "onnx:///models/bin.onnx?threads=0",
    ];
    for case in cases {
      let url = Url::parse(case).unwrap();
      assert!(BinDetectorBuilder::from_url(&url).is_err(), "{case}");
    }
  }

  #[test]
  fn missing_model_file_fails_to_build() {
    let result = BinDetectorBuilder::new("/definitely/not/a/model.onnx").build();
    assert!(result.is_err());
  }
}
