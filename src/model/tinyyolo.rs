// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/tinyyolo.rs - Tiny YOLO v3 检测后处理
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

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  engine::InferenceEngine,
  feature::{ArrayFeature, AspectMode, Feature, FeatureError, FeatureType, ImageType},
  model::{Detection, LabelSet, Predictor, Rect},
  tensor::{ElementType, ScopedTensor, TensorError, TensorHandle},
};

/// 模型固定的正方形输入分辨率
pub const TINY_YOLO_V3_INPUT_SIZE: usize = 416;

const TINY_YOLO_V3_NUM_OUTPUTS: usize = 3;
const BOXES_OUTPUT: usize = 0;
const SCORES_OUTPUT: usize = 1;
const SELECTIONS_OUTPUT: usize = 2;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("预期模型输出数量为 {expected}, 实际为 {actual}")]
  OutputCount { expected: usize, actual: usize },
  #[error("输出 {name} 读取失败: {source}")]
  Tensor {
    name: &'static str,
    #[source]
    source: TensorError,
  },
  #[error("第 {selection} 个选择的 {field} 为负数: {value}")]
  NegativeIndex {
    selection: usize,
    field: &'static str,
    value: i32,
  },
  #[error("类别编号 {class_id} 超出标签范围 ({labels} 个标签)")]
  LabelOutOfRange { class_id: usize, labels: usize },
}

impl DecodeError {
  fn tensor(name: &'static str) -> impl FnOnce(TensorError) -> Self {
    move |source| DecodeError::Tensor { name, source }
  }
}

#[derive(Error, Debug)]
pub enum TinyYoloError {
  #[error("TinyYOLOv3 预测器收到 {actual} 个标签, 但模型需要 {expected} 个")]
  ConfigurationError { expected: usize, actual: usize },
  #[error("模型无效: {0}")]
  InvalidModel(String),
  #[error("参数无效: {0}")]
  InvalidArgument(String),
  #[error("特征错误: {0}")]
  FeatureError(#[from] FeatureError),
  #[error("推理错误: {0}")]
  InferenceError(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("解码错误: {0}")]
  DecodeError(#[from] DecodeError),
}

impl TinyYoloError {
  pub fn invalid_argument(msg: &str) -> Self {
    TinyYoloError::InvalidArgument(msg.to_string())
  }
}

/// Tiny YOLO v3 目标检测预测器
///
/// 模型在内部完成阈值过滤与非极大值抑制，输出三个张量：
/// `boxes` `[1, B, 4]`、`scores` `[1, C, B]`、`selections` `[1, N, 3]`。
/// 本预测器只负责把它们解码为 [`Detection`] 列表。
pub struct TinyYoloV3<E> {
  engine: E,
  labels: LabelSet,
}

impl<E: InferenceEngine> TinyYoloV3<E> {
  pub fn new(engine: E, labels: impl Into<LabelSet>) -> Result<Self, TinyYoloError> {
    let labels = labels.into();
    let descriptor = engine.descriptor();

    if descriptor.outputs.len() != TINY_YOLO_V3_NUM_OUTPUTS {
      let err = TinyYoloError::InvalidModel(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        TINY_YOLO_V3_NUM_OUTPUTS,
        descriptor.outputs.len()
      ));
      error!("{}", err);
      return Err(err);
    }

    // 类别数量取自 scores 输出的第二维
    let classes = match &descriptor.outputs[SCORES_OUTPUT] {
      FeatureType::Array(array) if array.shape.len() > 1 => array.shape[1],
      other => {
        let err = TinyYoloError::InvalidModel(format!(
          "scores 输出必须是至少二维的数组, 实际为 {:?}",
          other
        ));
        error!("{}", err);
        return Err(err);
      }
    };

    if labels.len() != classes {
      let err = TinyYoloError::ConfigurationError {
        expected: classes,
        actual: labels.len(),
      };
      error!("{}", err);
      return Err(err);
    }

    debug!("模型输入数量: {}", descriptor.inputs.len());
    debug!("模型输出数量: {}", descriptor.outputs.len());
    info!("TinyYOLOv3 预测器就绪, 类别数量: {}", classes);

    Ok(TinyYoloV3 { engine, labels })
  }

  pub fn labels(&self) -> &LabelSet {
    &self.labels
  }
}

impl<E: InferenceEngine> Predictor for TinyYoloV3<E> {
  type Output = Vec<Detection>;
  type Error = TinyYoloError;

  fn predict<F: Feature>(&self, inputs: &mut [F]) -> Result<Self::Output, Self::Error> {
    let count = inputs.len();
    let input = match inputs {
      [input] => input,
      _ => {
        error!("TinyYOLOv3 预测器需要单个特征, 实际收到 {} 个", count);
        return Err(TinyYoloError::invalid_argument(
          "TinyYOLOv3 预测器需要单个特征",
        ));
      }
    };

    // 输入总是平面布局 [batch, channel, height, width]
    let shape = input.feature_type().shape().ok_or_else(|| {
      error!("输入特征不是数组或图像特征");
      TinyYoloError::invalid_argument("TinyYOLOv3 预测器需要数组或图像特征")
    })?;
    let (height, width) = match shape[..] {
      [_, _, height, width] => (height, width),
      _ => {
        error!("输入特征形状无效: {:?}", shape);
        return Err(TinyYoloError::InvalidArgument(format!(
          "输入特征必须是四维平面布局, 实际形状 {:?}",
          shape
        )));
      }
    };
    debug!("原始输入尺寸: {}x{}", width, height);

    let size_feature = ArrayFeature::new(vec![height as f32, width as f32], vec![1, 2])?;

    if let Some(image) = input.as_image_mut() {
      image.set_aspect_mode(AspectMode::AspectFit);
    }

    let input_type = FeatureType::Image(ImageType::rgb(
      TINY_YOLO_V3_INPUT_SIZE,
      TINY_YOLO_V3_INPUT_SIZE,
      ElementType::Float32,
    ));

    let outputs = {
      let image_tensor = ScopedTensor::new(input.create(&input_type)?);
      let size_tensor = ScopedTensor::new(size_feature.create(&size_feature.feature_type())?);

      debug!("执行模型推理");
      let outputs = self
        .engine
        .predict(&image_tensor, &size_tensor)
        .map_err(|e| {
          error!("模型推理失败: {}", e);
          TinyYoloError::InferenceError(Box::new(e))
        })?;

      outputs
        .into_iter()
        .map(ScopedTensor::new)
        .collect::<Vec<_>>()
    };

    debug!("后处理模型输出");
    let detections = decode(&outputs, &self.labels, height as f32).inspect_err(|e| {
      error!("模型输出解码失败: {}", e);
    })?;
    debug!("检测到 {} 个物体", detections.len());

    Ok(detections)
  }
}

/// 把 (boxes, scores, selections) 三个输出解码为检测结果
///
/// 结果顺序与 `selections` 一致，不再做排序或抑制。矩形换算为以左下角为原点，
/// 不做裁剪。
pub fn decode<H: TensorHandle>(
  outputs: &[H],
  labels: &LabelSet,
  image_height: f32,
) -> Result<Vec<Detection>, DecodeError> {
  if outputs.len() != TINY_YOLO_V3_NUM_OUTPUTS {
    return Err(DecodeError::OutputCount {
      expected: TINY_YOLO_V3_NUM_OUTPUTS,
      actual: outputs.len(),
    });
  }

  let boxes = outputs[BOXES_OUTPUT]
    .view_f32()
    .map_err(DecodeError::tensor("boxes"))?;
  let scores = outputs[SCORES_OUTPUT]
    .view_f32()
    .map_err(DecodeError::tensor("scores"))?;
  let selections = outputs[SELECTIONS_OUTPUT]
    .view_i32()
    .map_err(DecodeError::tensor("selections"))?;

  boxes.expect_rank(3).map_err(DecodeError::tensor("boxes"))?;
  scores.expect_rank(3).map_err(DecodeError::tensor("scores"))?;
  selections
    .expect_rank(3)
    .map_err(DecodeError::tensor("selections"))?;

  let count = selections
    .dim(1)
    .map_err(DecodeError::tensor("selections"))?;
  debug!(
    "boxes {:?}, scores {:?}, selections {:?}",
    boxes.shape(),
    scores.shape(),
    selections.shape()
  );

  let index = |selection: usize, field: usize, name: &'static str| -> Result<usize, DecodeError> {
    let value = selections
      .get(&[0, selection, field])
      .map_err(DecodeError::tensor("selections"))?;
    usize::try_from(value).map_err(|_| DecodeError::NegativeIndex {
      selection,
      field: name,
      value,
    })
  };

  let mut detections = Vec::with_capacity(count);
  for i in 0..count {
    let batch = index(i, 0, "batch")?;
    let class_id = index(i, 1, "class")?;
    let box_id = index(i, 2, "box")?;

    let coord = |k: usize| {
      boxes
        .get(&[batch, box_id, k])
        .map_err(DecodeError::tensor("boxes"))
    };
    let (top, left, bottom, right) = (coord(0)?, coord(1)?, coord(2)?, coord(3)?);

    let score = scores
      .get(&[batch, class_id, box_id])
      .map_err(DecodeError::tensor("scores"))?;

    let label = labels
      .get(class_id)
      .ok_or(DecodeError::LabelOutOfRange {
        class_id,
        labels: labels.len(),
      })?;

    detections.push(Detection {
      label: label.to_string(),
      rect: Rect::from_top_down(top, left, bottom, right, image_height),
      score,
    });
  }

  Ok(detections)
}

/// 构建 [`TinyYoloV3`]，未指定标签时使用 COCO 标签
pub struct TinyYoloV3Builder<E> {
  engine: E,
  labels: Option<LabelSet>,
}

impl<E: InferenceEngine> TinyYoloV3Builder<E> {
  pub fn new(engine: E) -> Self {
    TinyYoloV3Builder {
      engine,
      labels: None,
    }
  }

  pub fn labels(mut self, labels: impl Into<LabelSet>) -> Self {
    self.labels = Some(labels.into());
    self
  }

  pub fn build(self) -> Result<TinyYoloV3<E>, TinyYoloError> {
    TinyYoloV3::new(self.engine, self.labels.unwrap_or_default())
  }
}
