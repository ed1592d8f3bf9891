// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/tinyyolo.rs - TinyYOLOv3 预测器集成测试
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

use std::{
  cell::{Cell, RefCell},
  rc::Rc,
};

use shanan_tinyyolo::{
  engine::{InferenceEngine, ModelDescriptor},
  feature::{
    ArrayFeature, ArrayType, AspectMode, Feature, FeatureError, FeatureType, ImageFeature,
    ImageType,
  },
  model::{DecodeError, Detection, LabelSet, Predictor, Rect, TinyYoloError, TinyYoloV3},
  tensor::{ElementType, Tensor, TensorError, TensorHandle},
};

/// 与测试共享释放标记的输出张量
struct TrackedTensor {
  tensor: Tensor,
  released: Rc<Cell<bool>>,
}

impl TensorHandle for TrackedTensor {
  fn shape(&self) -> Result<&[usize], TensorError> {
    self.tensor.shape()
  }

  fn as_f32(&self) -> Result<&[f32], TensorError> {
    self.tensor.as_f32()
  }

  fn as_i32(&self) -> Result<&[i32], TensorError> {
    self.tensor.as_i32()
  }

  fn release(&mut self) {
    self.tensor.release();
    self.released.set(true);
  }
}

#[derive(Debug, thiserror::Error)]
#[error("engine failure")]
struct EngineFailure;

struct MockEngine {
  descriptor: ModelDescriptor,
  outputs: Vec<Tensor>,
  fail: bool,
  issued: RefCell<Vec<Rc<Cell<bool>>>>,
  seen_image_shape: RefCell<Option<Vec<usize>>>,
  seen_size: RefCell<Option<Vec<f32>>>,
}

impl MockEngine {
  fn new(outputs: Vec<Tensor>) -> Self {
    let descriptor = ModelDescriptor {
      inputs: vec![],
      outputs: outputs
        .iter()
        .map(|tensor| {
          FeatureType::Array(ArrayType {
            shape: tensor.shape().unwrap().to_vec(),
            element: tensor.element_type(),
          })
        })
        .collect(),
    };
    MockEngine {
      descriptor,
      outputs,
      fail: false,
      issued: RefCell::new(Vec::new()),
      seen_image_shape: RefCell::new(None),
      seen_size: RefCell::new(None),
    }
  }

  fn failing(mut self) -> Self {
    self.fail = true;
    self
  }
}

impl InferenceEngine for &MockEngine {
  type Output = TrackedTensor;
  type Error = EngineFailure;

  fn descriptor(&self) -> &ModelDescriptor {
    &self.descriptor
  }

  fn predict(&self, image: &Tensor, size: &Tensor) -> Result<Vec<Self::Output>, Self::Error> {
    *self.seen_image_shape.borrow_mut() = Some(image.shape().unwrap().to_vec());
    *self.seen_size.borrow_mut() = Some(size.as_f32().unwrap().to_vec());
    if self.fail {
      return Err(EngineFailure);
    }

    Ok(
      self
        .outputs
        .iter()
        .map(|tensor| {
          let released = Rc::new(Cell::new(false));
          self.issued.borrow_mut().push(released.clone());
          TrackedTensor {
            tensor: tensor.clone(),
            released,
          }
        })
        .collect(),
    )
  }
}

/// 任意尺寸的平面图像特征，`create` 直接产生目标形状的零张量
struct PlanarImage {
  width: usize,
  height: usize,
  aspect_mode: AspectMode,
}

impl PlanarImage {
  fn new(width: usize, height: usize) -> Self {
    PlanarImage {
      width,
      height,
      aspect_mode: AspectMode::ScaleToFit,
    }
  }
}

impl ImageFeature for PlanarImage {
  fn aspect_mode(&self) -> AspectMode {
    self.aspect_mode
  }

  fn set_aspect_mode(&mut self, mode: AspectMode) {
    self.aspect_mode = mode;
  }
}

impl Feature for PlanarImage {
  fn feature_type(&self) -> FeatureType {
    FeatureType::Image(ImageType::rgb(self.width, self.height, ElementType::UInt8))
  }

  fn create(&self, target: &FeatureType) -> Result<Tensor, FeatureError> {
    let shape = target.shape().unwrap_or_default();
    let len = shape.iter().product();
    Ok(Tensor::from_f32(shape, vec![0.0; len])?)
  }

  fn as_image_mut(&mut self) -> Option<&mut dyn ImageFeature> {
    Some(self)
  }
}

struct TextFeature;

impl Feature for TextFeature {
  fn feature_type(&self) -> FeatureType {
    FeatureType::Text
  }

  fn create(&self, target: &FeatureType) -> Result<Tensor, FeatureError> {
    Err(FeatureError::Incompatible {
      expected: target.clone(),
      actual: FeatureType::Text,
    })
  }
}

/// 无法转换为张量的图像特征
struct UnreadableImage;

impl Feature for UnreadableImage {
  fn feature_type(&self) -> FeatureType {
    FeatureType::Image(ImageType::rgb(400, 300, ElementType::UInt8))
  }

  fn create(&self, _target: &FeatureType) -> Result<Tensor, FeatureError> {
    Err(FeatureError::UnsupportedElement(ElementType::Int32))
  }
}

/// boxes `[1, B, 4]`, scores `[1, C, B]`, selections `[1, N, 3]`
fn outputs(classes: usize, boxes: Vec<f32>, scores: Vec<f32>, selections: Vec<i32>) -> Vec<Tensor> {
  let num_boxes = boxes.len() / 4;
  assert_eq!(scores.len(), classes * num_boxes);
  vec![
    Tensor::from_f32(vec![1, num_boxes, 4], boxes).unwrap(),
    Tensor::from_f32(vec![1, classes, num_boxes], scores).unwrap(),
    Tensor::from_i32(vec![1, selections.len() / 3, 3], selections).unwrap(),
  ]
}

fn labels(names: &[&str]) -> LabelSet {
  LabelSet::from(names)
}

/// 6 个候选框、3 个类别；第 5 个框为 (10, 20, 110, 220)，scores[2][5] = 0.87
fn cat_outputs(selections: Vec<i32>) -> Vec<Tensor> {
  let mut boxes = Vec::new();
  for i in 0..6 {
    let offset = i as f32;
    boxes.extend_from_slice(&[offset, offset, offset + 10.0, offset + 20.0]);
  }
  boxes[20..24].copy_from_slice(&[10.0, 20.0, 110.0, 220.0]);

  let mut scores = vec![0.1; 3 * 6];
  scores[2 * 6 + 5] = 0.87;
  scores[6 + 1] = 0.9;
  scores[2] = 0.2;
  scores[4] = 0.5;

  outputs(3, boxes, scores, selections)
}

fn all_released(engine: &MockEngine) -> bool {
  engine.issued.borrow().iter().all(|flag| flag.get())
}

#[test]
fn construction_accepts_matching_label_count() {
  let engine = MockEngine::new(cat_outputs(vec![]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();
  assert_eq!(predictor.labels().len(), 3);
}

#[test]
fn construction_rejects_mismatched_label_count() {
  let engine = MockEngine::new(cat_outputs(vec![]));
  for names in [&[][..], &["dog", "bird"][..], &["a", "b", "c", "d"][..]] {
    match TinyYoloV3::new(&engine, labels(names)) {
      Err(TinyYoloError::ConfigurationError { expected, actual }) => {
        assert_eq!(expected, 3);
        assert_eq!(actual, names.len());
      }
      other => panic!("expected configuration error, got {:?}", other.err()),
    }
  }
}

#[test]
fn construction_rejects_wrong_output_count() {
  let mut tensors = cat_outputs(vec![]);
  tensors.pop();
  let engine = MockEngine::new(tensors);
  assert!(matches!(
    TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])),
    Err(TinyYoloError::InvalidModel(_))
  ));
}

#[test]
fn predict_requires_exactly_one_feature() {
  let engine = MockEngine::new(cat_outputs(vec![0, 2, 5]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();

  assert!(matches!(
    predictor.predict::<PlanarImage>(&mut []),
    Err(TinyYoloError::InvalidArgument(_))
  ));
  assert!(matches!(
    predictor.predict(&mut [PlanarImage::new(400, 300), PlanarImage::new(400, 300)]),
    Err(TinyYoloError::InvalidArgument(_))
  ));
  assert!(engine.issued.borrow().is_empty());
  assert!(engine.seen_size.borrow().is_none());
}

#[test]
fn predict_rejects_non_array_feature() {
  let engine = MockEngine::new(cat_outputs(vec![0, 2, 5]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();

  assert!(matches!(
    predictor.predict(&mut [TextFeature]),
    Err(TinyYoloError::InvalidArgument(_))
  ));
  assert!(engine.seen_size.borrow().is_none());
}

#[test]
fn predict_rejects_non_planar_feature() {
  let engine = MockEngine::new(cat_outputs(vec![0, 2, 5]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();

  let flat = ArrayFeature::new(vec![0.0f32; 300 * 400], vec![1, 300, 400]).unwrap();
  assert!(matches!(
    predictor.predict(&mut [flat]),
    Err(TinyYoloError::InvalidArgument(_))
  ));
  assert!(engine.seen_size.borrow().is_none());
  assert!(engine.issued.borrow().is_empty());
}

#[test]
fn feature_conversion_failure_is_propagated() {
  let engine = MockEngine::new(cat_outputs(vec![0, 2, 5]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();

  assert!(matches!(
    predictor.predict(&mut [UnreadableImage]),
    Err(TinyYoloError::FeatureError(FeatureError::UnsupportedElement(
      ElementType::Int32
    )))
  ));
  assert!(engine.seen_size.borrow().is_none());
  assert!(engine.issued.borrow().is_empty());
}

#[test]
fn predict_accepts_boxed_features() {
  let engine = MockEngine::new(cat_outputs(vec![0, 2, 5]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();

  let mut inputs: Vec<Box<dyn Feature>> = vec![Box::new(PlanarImage::new(400, 300))];
  assert_eq!(predictor.predict(&mut inputs).unwrap().len(), 1);

  inputs.push(Box::new(TextFeature));
  assert!(matches!(
    predictor.predict(&mut inputs),
    Err(TinyYoloError::InvalidArgument(_))
  ));
}

#[test]
fn label_score_and_rect_are_bound_to_selection() {
  let engine = MockEngine::new(cat_outputs(vec![0, 2, 5]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();

  let detections = predictor.predict(&mut [PlanarImage::new(400, 300)]).unwrap();
  assert_eq!(
    detections,
    vec![Detection {
      label: "cat".to_string(),
      rect: Rect {
        x: 20.0,
        y: 190.0,
        width: 200.0,
        height: 100.0,
      },
      score: 0.87,
    }]
  );
}

#[test]
fn detection_count_matches_selection_count() {
  let engine = MockEngine::new(cat_outputs(vec![0, 2, 5, 0, 1, 1, 0, 0, 2]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();
  assert_eq!(predictor.predict(&mut [PlanarImage::new(400, 300)]).unwrap().len(), 3);

  let engine = MockEngine::new(cat_outputs(vec![]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();
  let detections = predictor.predict(&mut [PlanarImage::new(400, 300)]).unwrap();
  assert!(detections.is_empty());
}

#[test]
fn detections_follow_selection_order() {
  // 分数依次为 0.2, 0.9, 0.5，不应被重新排序
  let engine = MockEngine::new(cat_outputs(vec![0, 0, 2, 0, 1, 1, 0, 0, 4]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();

  let detections = predictor.predict(&mut [PlanarImage::new(400, 300)]).unwrap();
  let summary: Vec<(&str, f32)> = detections
    .iter()
    .map(|d| (d.label.as_str(), d.score))
    .collect();
  assert_eq!(summary, vec![("dog", 0.2), ("bird", 0.9), ("dog", 0.5)]);
}

#[test]
fn predict_letterboxes_and_sends_original_size() {
  let engine = MockEngine::new(cat_outputs(vec![0, 2, 5]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();

  let mut inputs = [PlanarImage::new(400, 300)];
  predictor.predict(&mut inputs).unwrap();

  assert_eq!(inputs[0].aspect_mode(), AspectMode::AspectFit);
  assert_eq!(*engine.seen_size.borrow(), Some(vec![300.0, 400.0]));
  assert_eq!(*engine.seen_image_shape.borrow(), Some(vec![1, 3, 416, 416]));
}

#[test]
fn outputs_are_released_after_success() {
  let engine = MockEngine::new(cat_outputs(vec![0, 2, 5]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();

  predictor.predict(&mut [PlanarImage::new(400, 300)]).unwrap();
  assert_eq!(engine.issued.borrow().len(), 3);
  assert!(all_released(&engine));
}

#[test]
fn outputs_are_released_after_decode_failure() {
  // 框编号 9 超出 6 个候选框
  let engine = MockEngine::new(cat_outputs(vec![0, 2, 5, 0, 1, 9]));
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();

  let result = predictor.predict(&mut [PlanarImage::new(400, 300)]);
  assert!(matches!(
    result,
    Err(TinyYoloError::DecodeError(DecodeError::Tensor { name: "boxes", .. }))
  ));
  assert_eq!(engine.issued.borrow().len(), 3);
  assert!(all_released(&engine));
}

#[test]
fn inference_failure_is_propagated() {
  let engine = MockEngine::new(cat_outputs(vec![0, 2, 5])).failing();
  let predictor = TinyYoloV3::new(&engine, labels(&["dog", "bird", "cat"])).unwrap();

  match predictor.predict(&mut [PlanarImage::new(400, 300)]) {
    Err(TinyYoloError::InferenceError(source)) => {
      assert!(source.downcast_ref::<EngineFailure>().is_some());
    }
    other => panic!("expected inference error, got {:?}", other),
  }
  assert!(engine.issued.borrow().is_empty());
}

#[cfg(feature = "read_image_file")]
mod replay {
  use super::*;
  use image::RgbImage;
  use shanan_tinyyolo::{engine::ReplayEngine, feature::ImageFileFeature, model::TinyYoloV3Builder};

  fn replay_engine() -> ReplayEngine {
    ReplayEngine::new(
      ImageType::rgb(416, 416, ElementType::Float32),
      cat_outputs(vec![0, 2, 5, 0, 1, 1]),
    )
    .unwrap()
  }

  #[test]
  fn decodes_replayed_outputs_for_image_file() {
    let predictor = TinyYoloV3Builder::new(replay_engine())
      .labels(labels(&["dog", "bird", "cat"]))
      .build()
      .unwrap();

    let mut inputs = [ImageFileFeature::from(RgbImage::new(400, 300))];
    let detections = predictor.predict(&mut inputs).unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].label, "cat");
    assert_eq!(detections[0].rect.y, 190.0);
    assert_eq!(detections[1].label, "bird");
    assert_eq!(inputs[0].aspect_mode(), AspectMode::AspectFit);
  }

  #[test]
  fn builder_defaults_to_coco_labels() {
    // 录制输出只有 3 个类别，与 80 个 COCO 标签不符
    assert!(matches!(
      TinyYoloV3Builder::new(replay_engine()).build(),
      Err(TinyYoloError::ConfigurationError {
        expected: 3,
        actual: 80,
      })
    ));
  }

  #[test]
  fn predictor_can_be_shared_between_threads() {
    let predictor = TinyYoloV3::new(replay_engine(), labels(&["dog", "bird", "cat"])).unwrap();

    std::thread::scope(|scope| {
      let handles: Vec<_> = (0..4)
        .map(|_| {
          scope.spawn(|| {
            let mut inputs = [ImageFileFeature::from(RgbImage::new(320, 240))];
            predictor.predict(&mut inputs).map(|d| d.len())
          })
        })
        .collect();
      for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), 2);
      }
    });
  }
}
