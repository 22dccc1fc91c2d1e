// 该文件是 BINtrack 项目的一部分。
// src/output/json_report.rs - 逐行 JSON 检测报告
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

use std::{
  fs::OpenOptions,
  io::{BufWriter, Write},
  path::PathBuf,
  sync::Mutex,
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme, input::Submission, model::DetectionResult, url_path,
};

#[derive(Error, Debug)]
pub enum JsonReportError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("报告写入器已被污染")]
  WriterPoisoned,
}

#[derive(Serialize)]
struct ReportLine<'a> {
  name: &'a str,
  #[serde(flatten)]
  result: &'a DetectionResult,
}

/// 每次提交追加一行 JSON。
///
/// `json:///var/log/bintrack.jsonl` 追加到文件，`json:-` 或空路径写到标准输出。
pub struct JsonReportOutput {
  target: Option<PathBuf>,
  writer: Mutex<Box<dyn Write + Send>>,
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReportOutput {
  type Error = JsonReportError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonReportError::SchemeMismatch(format!(
        "期望报告方式 '{}', 实际报告方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let path = url_path(uri);
    if path.as_os_str().is_empty() || path.as_os_str() == "-" {
      debug!("JSON 报告输出到标准输出");
      return Ok(Self::from_writer(std::io::stdout()));
    }

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    info!("JSON 报告追加到文件: {}", path.display());

    Ok(Self {
      target: Some(path),
      writer: Mutex::new(Box::new(BufWriter::new(file))),
    })
  }
}

impl JsonReportOutput {
  pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
    Self {
      target: None,
      writer: Mutex::new(Box::new(writer)),
    }
  }

  /// 报告文件路径，输出到标准输出或自定义写入器时为 `None`
  pub fn target(&self) -> Option<&PathBuf> {
    self.target.as_ref()
  }
}

impl crate::output::Render<Submission, DetectionResult> for JsonReportOutput {
  type Error = JsonReportError;

  fn render_result(
    &self,
    submission: &Submission,
    result: &DetectionResult,
  ) -> Result<(), Self::Error> {
    let line = serde_json::to_string(&ReportLine {
      name: &submission.name,
      result,
    })?;

    let mut writer = self
      .writer
      .lock()
      .map_err(|_| JsonReportError::WriterPoisoned)?;
    writeln!(writer, "{line}")?;
    writer.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::{
    input::ImageSource,
    model::{BIN_LABEL, Detection},
    output::Render,
  };

  #[derive(Clone, Default)]
  struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

  impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  fn submission(name: &str) -> Submission {
    Submission {
      name: name.to_string(),
      source: ImageSource::from(Vec::new()),
    }
  }

  #[test]
  fn one_line_per_submission() {
    let buffer = SharedBuffer::default();
    let output = JsonReportOutput::from_writer(buffer.clone());

    let positive = DetectionResult::from_detections(
      vec![Detection {
        label: BIN_LABEL.to_string(),
        confidence: 0.5,
        bbox: [0.0, 0.0, 10.0, 10.0],
      }],
      0.2,
    );
    output.render_result(&submission("a.jpg"), &positive).unwrap();
    output
      .render_result(&submission("b.jpg"), &DetectionResult::negative())
      .unwrap();

    let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<serde_json::Value> = text
      .lines()
      .map(|l| serde_json::from_str(l).unwrap())
      .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["name"], "a.jpg");
    assert_eq!(lines[0]["isBin"], true);
    assert_eq!(lines[1]["name"], "b.jpg");
    assert_eq!(lines[1]["isBin"], false);
    assert_eq!(lines[1]["highestConfidence"], 0.0);
  }

  #[test]
  fn file_reports_are_appended() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports/out.jsonl");
    let url = url::Url::parse(&format!("json://{}", path.display())).unwrap();

    for name in ["first.jpg", "second.jpg"] {
      let output = JsonReportOutput::from_url(&url).unwrap();
      assert_eq!(output.target(), Some(&path));
      output
        .render_result(&submission(name), &DetectionResult::negative())
        .unwrap();
    }

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("second.jpg"));
  }

  #[test]
  fn dash_means_stdout() {
    let url = url::Url::parse("json:-").unwrap();
    assert!(JsonReportOutput::from_url(&url).unwrap().target().is_none());
  }
}
