// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;

use crate::feature::Feature;

pub trait Predictor {
  type Output;
  type Error;

  fn predict<F: Feature>(&self, inputs: &mut [F]) -> Result<Self::Output, Self::Error>;
}

/// 以左下角为原点的矩形，单位为原图像素
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl Rect {
  /// 由自上而下的 (top, left, bottom, right) 坐标构造，纵轴翻转为自下而上
  pub fn from_top_down(top: f32, left: f32, bottom: f32, right: f32, image_height: f32) -> Self {
    Rect {
      x: left,
      y: image_height - bottom,
      width: right - left,
      height: bottom - top,
    }
  }

  /// 换算回以左上角为原点时的上边界
  pub fn top(&self, image_height: f32) -> f32 {
    image_height - self.y - self.height
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub label: String,
  pub rect: Rect,
  pub score: f32,
}

mod labels;
pub use self::labels::{COCO_LABELS, LabelSet, LabelSetError};

mod tinyyolo;
pub use self::tinyyolo::{
  DecodeError, TINY_YOLO_V3_INPUT_SIZE, TinyYoloError, TinyYoloV3, TinyYoloV3Builder, decode,
};
