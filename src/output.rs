// 该文件是 BINtrack 项目的一部分。
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
// Copyright (C) 2026 BINtrack contributors

use thiserror::Error;
use url::Url;

#[cfg(any(feature = "save_image_file", feature = "directory_record", feature = "json_report"))]
use crate::FromUrlWithScheme;
use crate::{FromUrl, input::Submission, model::DetectionResult};

pub trait Render<Input, Output>: Sized {
  type Error;
  fn render_result(&self, input: &Input, result: &Output) -> Result<(), Self::Error>;
}

#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[cfg(feature = "json_report")]
mod json_report;
#[cfg(feature = "json_report")]
pub use self::json_report::{JsonReportError, JsonReportOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[cfg(feature = "json_report")]
  #[error("JSON 报告输出错误: {0}")]
  JsonReportError(#[from] JsonReportError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
  #[cfg(feature = "json_report")]
  JsonReportOutput(JsonReportOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      #[cfg(feature = "json_report")]
      JsonReportOutput::SCHEME => {
        let output = JsonReportOutput::from_url(url)?;
        Ok(OutputWrapper::JsonReportOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<Submission, DetectionResult> for OutputWrapper {
  type Error = OutputError;

  #[allow(unused_variables)]
  fn render_result(
    &self,
    submission: &Submission,
    result: &DetectionResult,
  ) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(submission, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(submission, result)
        .map_err(OutputError::from),
      #[cfg(feature = "json_report")]
      OutputWrapper::JsonReportOutput(output) => output
        .render_result(submission, result)
        .map_err(OutputError::from),
      #[allow(unreachable_patterns)]
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}
