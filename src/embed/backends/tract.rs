#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, DynamicImage};
use tract_onnx::prelude::*;

use crate::embed::backend::{FaceEmbedder, EMBEDDING_DIM};

/// Tract-based face embedder.
///
/// Loads a Facenet-style ONNX model producing a 512-float embedding from a
/// fixed square RGB input. An optional face-presence model gates strict
/// instances: when its top score falls below the configured minimum the
/// embedder reports "no face" instead of embedding background pixels.
pub struct TractFaceEmbedder {
    model: TypedSimplePlan<TypedModel>,
    presence: Option<PresenceGate>,
    input_size: u32,
}

struct PresenceGate {
    model: TypedSimplePlan<TypedModel>,
    min_score: f32,
}

impl TractFaceEmbedder {
    /// Load the embedding model. Without a presence gate the instance is
    /// relaxed: it embeds whatever the frame contains.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model = load_model(model_path.as_ref(), input_size)?;
        Ok(Self {
            model,
            presence: None,
            input_size,
        })
    }

    /// Add a face-presence model; scores below `min_score` yield "no face".
    pub fn with_presence_gate<P: AsRef<Path>>(mut self, model_path: P, min_score: f32) -> Result<Self> {
        let model = load_model(model_path.as_ref(), self.input_size)?;
        self.presence = Some(PresenceGate { model, min_score });
        Ok(self)
    }

    fn build_input(&self, image: &DynamicImage) -> Result<Tensor> {
        let size = self.input_size;
        let rgb = image
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();
        let pixels = rgb.as_raw();

        let width = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, width, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                (pixels[idx] as f32 - 127.5) / 128.0
            },
        );

        Ok(input.into_tensor())
    }
}

impl FaceEmbedder for TractFaceEmbedder {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn embed(&mut self, image: &DynamicImage) -> Result<Option<Vec<f32>>> {
        let input = self.build_input(image)?;

        if let Some(gate) = &self.presence {
            let outputs = gate
                .model
                .run(tvec!(input.clone().into()))
                .context("face presence inference failed")?;
            let score = max_score(&outputs)?;
            if score < gate.min_score {
                return Ok(None);
            }
        }

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("face embedding inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("embedding model produced no outputs"))?;
        let values = output
            .to_array_view::<f32>()
            .context("embedding output tensor was not f32")?;
        let embedding: Vec<f32> = values.iter().cloned().collect();

        if embedding.len() != EMBEDDING_DIM {
            return Err(anyhow!(
                "embedding model produced {} values, expected {}",
                embedding.len(),
                EMBEDDING_DIM
            ));
        }

        Ok(Some(embedding))
    }
}

fn load_model(path: &Path, input_size: u32) -> Result<TypedSimplePlan<TypedModel>> {
    tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to load ONNX model from {}", path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, input_size as usize, input_size as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

fn max_score(outputs: &TVec<TValue>) -> Result<f32> {
    let output = outputs
        .first()
        .ok_or_else(|| anyhow!("presence model produced no outputs"))?;
    let scores = output
        .to_array_view::<f32>()
        .context("presence output tensor was not f32")?;
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if max.is_finite() {
        Ok(max)
    } else {
        Ok(0.0)
    }
}
