// 该文件是 BINtrack 项目的一部分。
// src/model/session.rs - ONNX Runtime 推理会话
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
  path::{Path, PathBuf},
  sync::Mutex,
};

use ort::{
  session::Session,
  value::{TensorRef, ValueType},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::PlanarFrame;

/// 模型原始输出：形状与按行主序展开的数据
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
  shape: Vec<usize>,
  data: Vec<f32>,
}

impl RawOutput {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
    RawOutput { shape, data }
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("模型加载错误: {path}: {source}")]
  ModelLoad {
    path: PathBuf,
    #[source]
    source: ort::Error,
  },
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(#[from] ort::Error),
  #[error("推理会话锁已损坏")]
  SessionPoisoned,
}

/// 推理后端：输入平面张量，输出第一个模型输出
pub trait InferenceBackend {
  fn infer(&self, frame: &PlanarFrame) -> Result<RawOutput, InferenceError>;
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for &B {
  fn infer(&self, frame: &PlanarFrame) -> Result<RawOutput, InferenceError> {
    (**self).infer(frame)
  }
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
  fn infer(&self, frame: &PlanarFrame) -> Result<RawOutput, InferenceError> {
    (**self).infer(frame)
  }
}

/// 基于 ONNX Runtime 的推理后端。
///
/// 会话在构造时加载一次，之后只读共享；`run` 需要可变借用，因此放在 `Mutex` 中。
pub struct OnnxBackend {
  session: Mutex<Session>,
  input_name: String,
  output_name: String,
  model_path: PathBuf,
}

impl std::fmt::Debug for OnnxBackend {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OnnxBackend")
      .field("input_name", &self.input_name)
      .field("output_name", &self.output_name)
      .field("model_path", &self.model_path)
      .finish()
  }
}

impl OnnxBackend {
  pub fn load(
    model_path: impl AsRef<Path>,
    intra_threads: Option<usize>,
  ) -> Result<Self, InferenceError> {
    let path = model_path.as_ref();
    info!("加载模型文件: {}", path.display());

    let mut builder = Session::builder()?;
    if let Some(threads) = intra_threads {
      debug!("算子内线程数: {}", threads);
      builder = builder.with_intra_threads(threads)?;
    }
    let session = builder
      .commit_from_file(path)
      .map_err(|source| InferenceError::ModelLoad {
        path: path.to_path_buf(),
        source,
      })?;

    // 输入名从模型中读取，不做硬编码
    let input = session
      .inputs
      .first()
      .ok_or_else(|| InferenceError::ModelInvalid("模型没有输入".to_string()))?;
    let input_name = input.name.clone();
    if let ValueType::Tensor { shape, .. } = &input.input_type {
      debug!("模型输入 '{}' 形状: {:?}", input_name, shape);
    }
    if session.inputs.len() != 1 {
      warn!(
        "预期模型输入数量为 1, 实际为 {}，只绑定第一个输入",
        session.inputs.len()
      );
    }

    let output_name = session
      .outputs
      .first()
      .map(|o| o.name.clone())
      .ok_or_else(|| InferenceError::ModelInvalid("模型没有输出".to_string()))?;
    debug!("模型输出数量: {}, 读取 '{}'", session.outputs.len(), output_name);

    info!("模型加载完成");

    Ok(OnnxBackend {
      session: Mutex::new(session),
      input_name,
      output_name,
      model_path: path.to_path_buf(),
    })
  }

  pub fn input_name(&self) -> &str {
    &self.input_name
  }

  pub fn output_name(&self) -> &str {
    &self.output_name
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }
}

impl InferenceBackend for OnnxBackend {
  fn infer(&self, frame: &PlanarFrame) -> Result<RawOutput, InferenceError> {
    debug!("设置模型输入 '{}': {:?}", self.input_name, frame.shape());
    let input_tensor = TensorRef::from_array_view(frame.as_array().view())?;
    let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

    let mut session = self
      .session
      .lock()
      .map_err(|_| InferenceError::SessionPoisoned)?;

    debug!("执行模型推理");
    let outputs = session.run(inputs)?;

    debug!("获取模型输出 '{}'", self.output_name);
    let (shape, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
    let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    debug!("模型输出形状: {:?}", shape);

    Ok(RawOutput::new(shape, data.to_vec()))
  }
}
