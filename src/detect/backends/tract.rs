#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::nms::non_max_suppression;
use crate::detect::result::{BoundingBox, RawBox};

/// Tract-based backend for YOLOv8-style ONNX detection heads.
///
/// Expects one `[1, 3, S, S]` float input in `[0, 1]` and one
/// `[1, 4 + classes, anchors]` output of center-size boxes followed by
/// per-class scores. Only local model files are loaded.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    iou: f32,
    names: Vec<String>,
}

impl TractBackend {
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        input_size: u32,
        names: Vec<String>,
        iou: f32,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            iou,
            names,
        })
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let size = self.input_size;
        let resized;
        let src = if image.dimensions() == (size, size) {
            image
        } else {
            resized = imageops::resize(image, size, size, FilterType::Triangle);
            &resized
        };
        let size = size as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            src.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        })
        .into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, min_confidence: f32) -> Result<Vec<RawBox>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(anyhow!("unexpected detection output shape {:?}", shape));
        }
        let classes = shape[1] - 4;
        let anchors = shape[2];

        let mut boxes = Vec::new();
        for a in 0..anchors {
            let mut best = (0usize, f32::NEG_INFINITY);
            for c in 0..classes {
                let score = view[[0, 4 + c, a]];
                if score > best.1 {
                    best = (c, score);
                }
            }
            if best.1 < min_confidence {
                continue;
            }
            boxes.push(RawBox {
                class_index: best.0,
                confidence: best.1,
                bbox: BoundingBox::from_cxcywh(
                    view[[0, 0, a]],
                    view[[0, 1, a]],
                    view[[0, 2, a]],
                    view[[0, 3, a]],
                ),
            });
        }
        non_max_suppression(&mut boxes, self.iou);
        Ok(boxes)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn predict(&mut self, image: &RgbImage, min_confidence: f32) -> Result<Vec<RawBox>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let boxes = self.decode(outputs, min_confidence)?;

        let (w, h) = image.dimensions();
        let sx = w as f32 / self.input_size as f32;
        let sy = h as f32 / self.input_size as f32;
        Ok(boxes
            .into_iter()
            .map(|b| RawBox {
                bbox: b.bbox.scaled(sx, sy).clamped(w, h),
                ..b
            })
            .collect())
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.predict(&blank, 1.0).map(|_| ())
    }
}
