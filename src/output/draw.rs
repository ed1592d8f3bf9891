// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;

use crate::{feature::ImageFileFeature, model::Detection};

const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

impl ToRgbImage for ImageFileFeature {
  fn to_rgb_image(&self) -> RgbImage {
    self.image().clone()
  }
}

impl ToRgbImage for RgbImage {
  fn to_rgb_image(&self) -> RgbImage {
    self.clone()
  }
}

pub struct Draw {
  thickness: i32,
  color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BOX_THICKNESS,
      color: BOX_COLOR,
    }
  }
}

impl Draw {
  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    for detection in detections {
      // 检测框是左下角原点，绘制前换回左上角原点
      let rect = &detection.rect;
      let x_min = (rect.x.floor() as i32).clamp(0, w - 1);
      let y_min = (rect.top(h as f32).floor() as i32).clamp(0, h - 1);
      let x_max = ((rect.x + rect.width).ceil() as i32).clamp(0, w - 1);
      let y_max = ((rect.top(h as f32) + rect.height).ceil() as i32).clamp(0, h - 1);

      for t in 0..self.thickness {
        let width = x_max - x_min - 2 * t;
        let height = y_max - y_min - 2 * t;
        if width <= 0 || height <= 0 {
          break;
        }
        let ring = imageproc::rect::Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, ring, Rgb(self.color));
      }
    }
  }

  pub fn draw_on<F: ToRgbImage>(&self, frame: &F, detections: &[Detection]) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_detections(&mut image, detections);
    image
  }
}
