// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/labels.rs - 类别标签
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

use std::path::Path;

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// COCO 数据集类别名称
pub const COCO_LABELS: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

const COCO_LABEL_SET_NAME: &str = "coco";

#[derive(Error, Debug)]
pub enum LabelSetError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按类别编号排列的标签
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
  labels: Box<[String]>,
}

impl LabelSet {
  pub fn coco() -> Self {
    COCO_LABELS.iter().copied().collect()
  }

  /// 每行一个标签，忽略空行
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelSetError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let labels: LabelSet = content
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .collect();
    info!(
      "从 {} 读取 {} 个标签",
      path.as_ref().display(),
      labels.len()
    );
    Ok(labels)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.labels.get(class_id).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl Default for LabelSet {
  fn default() -> Self {
    Self::coco()
  }
}

impl<S: Into<String>> FromIterator<S> for LabelSet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    LabelSet {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}

impl From<Vec<String>> for LabelSet {
  fn from(labels: Vec<String>) -> Self {
    LabelSet {
      labels: labels.into_boxed_slice(),
    }
  }
}

impl From<&[&str]> for LabelSet {
  fn from(labels: &[&str]) -> Self {
    labels.iter().copied().collect()
  }
}

impl FromUrlWithScheme for LabelSet {
  const SCHEME: &'static str = "labels";
}

impl FromUrl for LabelSet {
  type Error = LabelSetError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(LabelSetError::SchemeMismatch(url.scheme().to_string()));
    }

    // labels:coco 为内置标签，其余按文件路径读取
    if url.path() == COCO_LABEL_SET_NAME {
      return Ok(Self::coco());
    }
    Self::from_file(url.path())
  }
}
