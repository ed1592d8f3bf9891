// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine/replay.rs - 回放已记录的模型输出
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

use std::{fs::File, io::BufReader, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  engine::{InferenceEngine, ModelDescriptor},
  feature::{ArrayType, FeatureType, ImageType},
  model::TINY_YOLO_V3_INPUT_SIZE,
  tensor::{ElementType, Tensor, TensorError, TensorHandle},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录文件解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
  #[error("第 {index} 个输入不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  InputMismatch {
    index: usize,
    expected: Vec<usize>,
    actual: Vec<usize>,
  },
  #[error("记录数据第 {index} 个值 {value} 不是合法的 {dtype}")]
  InvalidValue {
    index: usize,
    value: f64,
    dtype: ElementType,
  },
}

#[derive(Debug, Deserialize)]
struct Recording {
  outputs: Vec<RecordedTensor>,
}

#[derive(Debug, Deserialize)]
struct RecordedTensor {
  dtype: ElementType,
  shape: Vec<usize>,
  data: Vec<f64>,
}

/// 整数类型的记录值必须是该类型范围内的整数，不做截断
fn integral<T: TryFrom<i64>>(dtype: ElementType, data: &[f64]) -> Result<Vec<T>, ReplayError> {
  data
    .iter()
    .enumerate()
    .map(|(index, &value)| {
      let invalid = ReplayError::InvalidValue {
        index,
        value,
        dtype,
      };
      if !value.is_finite() || value.fract() != 0.0 {
        return Err(invalid);
      }
      T::try_from(value as i64).map_err(|_| invalid)
    })
    .collect()
}

impl TryFrom<RecordedTensor> for Tensor {
  type Error = ReplayError;

  fn try_from(recorded: RecordedTensor) -> Result<Self, Self::Error> {
    let RecordedTensor { dtype, shape, data } = recorded;
    let tensor = match dtype {
      ElementType::Float32 => Tensor::from_f32(shape, data.iter().map(|&v| v as f32).collect()),
      ElementType::Int32 => Tensor::from_i32(shape, integral(dtype, &data)?),
      ElementType::UInt8 => Tensor::from_u8(shape, integral(dtype, &data)?),
    }?;
    Ok(tensor)
  }
}

/// 回放引擎：对任意合法输入都返回同一组记录下来的输出张量
///
/// 每次调用都返回新的拷贝，调用之间不共享缓冲区。
#[derive(Debug, Clone)]
pub struct ReplayEngine {
  descriptor: ModelDescriptor,
  outputs: Vec<Tensor>,
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngine {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayError::SchemeMismatch(url.scheme().to_string()));
    }

    Self::from_path(url.path())
  }
}

impl ReplayEngine {
  pub fn new(input: ImageType, outputs: Vec<Tensor>) -> Result<Self, ReplayError> {
    let mut output_types = Vec::with_capacity(outputs.len());
    for tensor in &outputs {
      output_types.push(FeatureType::Array(ArrayType {
        shape: tensor.shape()?.to_vec(),
        element: tensor.element_type(),
      }));
    }

    let descriptor = ModelDescriptor {
      inputs: vec![
        FeatureType::Image(input),
        FeatureType::Array(ArrayType {
          shape: vec![1, 2],
          element: ElementType::Float32,
        }),
      ],
      outputs: output_types,
    };
    debug!("回放引擎描述: {:?}", descriptor);

    Ok(ReplayEngine {
      descriptor,
      outputs,
    })
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
    let path = path.as_ref();
    info!("加载输出记录文件: {}", path.display());
    let reader = BufReader::new(File::open(path)?);
    let recording: Recording = serde_json::from_reader(reader)?;

    let outputs = recording
      .outputs
      .into_iter()
      .map(Tensor::try_from)
      .collect::<Result<Vec<_>, _>>()?;
    debug!("记录输出数量: {}", outputs.len());

    let input = ImageType::rgb(
      TINY_YOLO_V3_INPUT_SIZE,
      TINY_YOLO_V3_INPUT_SIZE,
      ElementType::Float32,
    );
    Self::new(input, outputs)
  }

  fn check_input(index: usize, expected: &FeatureType, tensor: &Tensor) -> Result<(), ReplayError> {
    let expected = expected.shape().unwrap_or_default();
    let actual = tensor.shape()?;
    if actual != expected.as_slice() || tensor.element_type() != ElementType::Float32 {
      error!(
        "第 {} 个输入不匹配: 期望 {:?}, 实际 {:?} ({})",
        index,
        expected,
        actual,
        tensor.element_type()
      );
      return Err(ReplayError::InputMismatch {
        index,
        expected,
        actual: actual.to_vec(),
      });
    }
    Ok(())
  }
}

impl InferenceEngine for ReplayEngine {
  type Output = Tensor;
  type Error = ReplayError;

  fn descriptor(&self) -> &ModelDescriptor {
    &self.descriptor
  }

  fn predict(&self, image: &Tensor, size: &Tensor) -> Result<Vec<Self::Output>, Self::Error> {
    Self::check_input(0, &self.descriptor.inputs[0], image)?;
    Self::check_input(1, &self.descriptor.inputs[1], size)?;
    debug!("原始图像尺寸输入: {:?}", size.as_f32()?);

    Ok(self.outputs.clone())
  }
}
