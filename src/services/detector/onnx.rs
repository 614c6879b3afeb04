use super::{CancerDetector, InferenceError, checked_probability};
use crate::config::ModelSettings;
use crate::infrastructure::StartupError;
use crate::models::DetectionResult;
use image::DynamicImage;
use image::imageops::FilterType;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tract_onnx::prelude::*;

type Plan = TypedRunnableModel<TypedModel>;

/// Binary classifier backed by an ONNX export of the trained Keras model.
///
/// Input is a channels-last `[1, height, width, 3]` f32 tensor in [0, 1];
/// output is a single sigmoid probability of malignancy.
pub struct OnnxDetector {
    model: Arc<Plan>,
    width: u32,
    height: u32,
}

impl OnnxDetector {
    /// Loads and optimizes the model. Failure here must stop the process.
    pub fn load(settings: &ModelSettings) -> Result<Self, StartupError> {
        let model_path = settings.model_path.clone();
        let (width, height) = (settings.input_width, settings.input_height);
        info!("Loading ONNX model from {}", model_path.display());

        let model = Self::build_plan(&model_path, width, height).map_err(|e| {
            error!("Failed to load model {}: {:?}", model_path.display(), e);
            StartupError::ModelLoad {
                path: model_path.clone(),
                reason: e.to_string(),
            }
        })?;

        info!("ONNX model loaded ({}x{} input)", width, height);
        Ok(Self {
            model: Arc::new(model),
            width,
            height,
        })
    }

    fn build_plan(path: &Path, width: u32, height: u32) -> TractResult<Plan> {
        tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, height as usize, width as usize, 3),
                ),
            )?
            .into_optimized()?
            .into_runnable()
    }

    fn run(model: &Plan, input: Tensor) -> Result<f32, InferenceError> {
        let outputs = model
            .run(tvec!(input.into_tvalue()))
            .map_err(|e| InferenceError::Model(e.to_string()))?;

        probability_from_outputs(&outputs)
    }
}

/// Reads the malignancy score: first element of the first output tensor.
fn probability_from_outputs(outputs: &[TValue]) -> Result<f32, InferenceError> {
    let output = outputs
        .first()
        .ok_or_else(|| InferenceError::Model("model returned no outputs".to_string()))?;
    let view = output
        .to_array_view::<f32>()
        .map_err(|e| InferenceError::Model(e.to_string()))?;
    let raw = view
        .iter()
        .next()
        .copied()
        .ok_or_else(|| InferenceError::Model("model output is empty".to_string()))?;

    checked_probability(raw)
}

/// Resizes to the model input with nearest-neighbour sampling, scales every
/// channel by 1/255 and adds the batch axis: `[1, height, width, 3]`.
pub fn preprocess(img: &DynamicImage, width: u32, height: u32) -> Tensor {
    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(&rgb, width, height, FilterType::Nearest);

    tract_ndarray::Array4::from_shape_fn(
        (1, height as usize, width as usize, 3),
        |(_, y, x, c)| f32::from(resized.get_pixel(x as u32, y as u32)[c]) / 255.0,
    )
    .into_tensor()
}

#[async_trait::async_trait]
impl CancerDetector for OnnxDetector {
    async fn predict(&self, image_path: &Path) -> Result<DetectionResult, InferenceError> {
        let bytes = tokio::fs::read(image_path).await?;
        let model = Arc::clone(&self.model);
        let (width, height) = (self.width, self.height);

        // Decoding and the forward pass are CPU bound
        let probability = tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory(&bytes)?;
            let input = preprocess(&img, width, height);
            Self::run(&model, input)
        })
        .await??;

        tracing::debug!("Model probability {:.4} for {}", probability, image_path.display());
        Ok(DetectionResult::from_probability(probability))
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
