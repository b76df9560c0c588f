use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView, ImageBuffer, Rgb};
use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::codec;
use crate::errors::{RetouchError, Result};
use crate::imageops::alpha::{replace_alpha, SoftMask};
use crate::imageops::padding::{fit_inside, pad_to_square, Placement};
use crate::settings::{QualityModel, QualitySettings};
use crate::source::{EncodedImage, SourceImage};
use crate::traits::{BackgroundRemover, ProgressCallback};

/// Input side used when the model declares a dynamic spatial size.
const DEFAULT_INPUT_SIZE: u32 = 1024;
/// Pixel normalization `(v - MEAN) / STD` expected by the ISNet exports.
const PIXEL_MEAN: f32 = 128.0;
const PIXEL_STD: f32 = 256.0;

const TOTAL_STEPS: u64 = 4;

/// A committed ONNX session plus the shape facts read from it once.
struct LoadedModel {
    session: Session,
    image_size: u32,
    input_name: String,
    output_name: String,
}

impl LoadedModel {
    fn load(model_path: &Path, device_id: i32) -> Result<Self> {
        let session = SessionBuilder::new()
            .map_err(|e| RetouchError::model("session builder initialization", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| RetouchError::model("execution provider registration", e))?
            .with_memory_pattern(true)
            .map_err(|e| RetouchError::model("memory pattern configuration", e))?
            .commit_from_file(model_path)
            .map_err(|e| RetouchError::Model {
                operation: format!("loading model file {}", model_path.display()),
                source: Box::new(e),
            })?;

        let input = session.inputs.first().ok_or_else(|| RetouchError::Configuration {
            message: format!("{} declares no inputs", model_path.display()),
        })?;
        let output = session.outputs.first().ok_or_else(|| RetouchError::Configuration {
            message: format!("{} declares no outputs", model_path.display()),
        })?;

        let image_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .and_then(|side| u32::try_from(side).ok())
            .filter(|&side| side > 0)
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            image_size,
            input_name: input.name.clone(),
            output_name: output.name.clone(),
            session,
        })
    }

    /// Runs the model on one image and returns its soft mask at native size.
    fn predict_mask(&mut self, image: &DynamicImage) -> Result<SoftMask> {
        let (width, height) = image.dimensions();
        let (tensor, placement) = preprocess(image, self.image_size)?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => TensorRef::from_array_view(&tensor)?])?;
        let prediction = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned();

        postprocess_mask(prediction, self.image_size, placement, width, height)
    }
}

/// Letterboxes `image` into a `side`×`side` NCHW tensor.
fn preprocess(image: &DynamicImage, side: u32) -> Result<(Array4<f32>, Placement)> {
    let (width, height) = image.dimensions();
    let (fit_w, fit_h) = fit_inside(width, height, side);
    let resized = imageops::resize(&image.to_rgb8(), fit_w, fit_h, FilterType::Lanczos3);
    let (padded, placement) =
        pad_to_square(&resized, side, Rgb([0, 0, 0])).ok_or(RetouchError::DimensionMismatch {
            expected: (side, side),
            actual: (fit_w, fit_h),
        })?;

    let side = side as usize;
    let tensor = Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        let value = padded.get_pixel(x as u32, y as u32)[c];
        (f32::from(value) - PIXEL_MEAN) / PIXEL_STD
    });
    Ok((tensor, placement))
}

/// Crops the letterbox off a `[1, 1, side, side]` prediction and scales it
/// back to `width`×`height`.
fn postprocess_mask(
    prediction: Array4<f32>,
    side: u32,
    placement: Placement,
    width: u32,
    height: u32,
) -> Result<SoftMask> {
    let expected = (side as usize) * (side as usize);
    let (raw, _) = prediction.into_raw_vec_and_offset();
    if raw.len() < expected {
        return Err(RetouchError::DimensionMismatch {
            expected: (side, side),
            actual: (raw.len() as u32, 1),
        });
    }

    let mask: SoftMask = ImageBuffer::from_raw(side, side, raw[..expected].to_vec()).ok_or(
        RetouchError::DimensionMismatch {
            expected: (side, side),
            actual: (side, side),
        },
    )?;
    let cropped = imageops::crop_imm(
        &mask,
        placement.x,
        placement.y,
        placement.width,
        placement.height,
    )
    .to_image();
    Ok(imageops::resize(&cropped, width, height, FilterType::Lanczos3))
}

/// `BackgroundRemover` backed by ONNX Runtime.
///
/// One session per `QualityModel`, loaded on first use from
/// `<model_dir>/<model_name>.onnx` and kept for the lifetime of the remover.
#[derive(Clone)]
pub struct OnnxRemover {
    inner: Arc<Inner>,
}

struct Inner {
    model_dir: PathBuf,
    device_id: i32,
    sessions: Mutex<HashMap<QualityModel, Arc<Mutex<LoadedModel>>>>,
}

impl Inner {
    fn model_path(&self, model: QualityModel) -> PathBuf {
        self.model_dir.join(format!("{}.onnx", model.model_name()))
    }

    fn session_for(&self, model: QualityModel) -> Result<Arc<Mutex<LoadedModel>>> {
        if let Some(loaded) = self.sessions.lock().get(&model) {
            return Ok(Arc::clone(loaded));
        }

        let path = self.model_path(model);
        info!(model = model.model_name(), path = %path.display(), "Loading segmentation model");
        let loaded = Arc::new(Mutex::new(LoadedModel::load(&path, self.device_id)?));

        Ok(Arc::clone(
            self.sessions.lock().entry(model).or_insert(loaded),
        ))
    }
}

impl OnnxRemover {
    pub fn new(model_dir: impl Into<PathBuf>, device_id: i32) -> Self {
        Self {
            inner: Arc::new(Inner {
                model_dir: model_dir.into(),
                device_id,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn model_path(&self, model: QualityModel) -> PathBuf {
        self.inner.model_path(model)
    }
}

impl std::fmt::Debug for OnnxRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxRemover")
            .field("model_dir", &self.inner.model_dir)
            .field("device_id", &self.inner.device_id)
            .field("loaded", &self.inner.sessions.lock().len())
            .finish()
    }
}

async fn blocking<T, F>(step: &'static str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RetouchError::Segmentation {
            message: format!("Segmentation {step} step aborted: {e}"),
        })?
}

#[async_trait]
impl BackgroundRemover for OnnxRemover {
    async fn remove_background(
        &self,
        image: &SourceImage,
        settings: &QualitySettings,
        on_progress: &mut ProgressCallback<'_>,
    ) -> Result<EncodedImage> {
        let source = image.clone();
        let decoded = blocking("decode", move || source.decode()).await?;
        on_progress("decode", 1, TOTAL_STEPS);

        let inner = Arc::clone(&self.inner);
        let model = settings.model;
        let loaded = blocking("load-model", move || inner.session_for(model)).await?;
        on_progress("load-model", 2, TOTAL_STEPS);

        let (decoded, mask) = blocking("inference", move || {
            let mask = loaded.lock().predict_mask(&decoded)?;
            Ok((decoded, mask))
        })
        .await?;
        on_progress("inference", 3, TOTAL_STEPS);

        let format = settings.output_format;
        let quality = settings.output_quality;
        let bytes = blocking("encode", move || {
            let rgba = replace_alpha(&decoded, &mask)?;
            codec::encode(&DynamicImage::ImageRgba8(rgba), format, quality)
        })
        .await?;
        on_progress("encode", 4, TOTAL_STEPS);

        debug!(model = model.model_name(), size = bytes.len(), "Background removed");
        Ok(EncodedImage::new(format, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_preprocess_letterboxes() -> Result<()> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([255, 255, 255])));
        let (tensor, placement) = preprocess(&img, 16)?;

        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        assert_eq!(
            placement,
            Placement {
                x: 0,
                y: 4,
                width: 16,
                height: 8
            }
        );
        let white = (255.0 - PIXEL_MEAN) / PIXEL_STD;
        let black = -PIXEL_MEAN / PIXEL_STD;
        assert!((tensor[[0, 0, 8, 8]] - white).abs() < 0.05);
        assert!((tensor[[0, 2, 0, 0]] - black).abs() < f32::EPSILON);
        Ok(())
    }

    #[test]
    fn test_postprocess_crops_and_scales() -> Result<()> {
        let side = 8usize;
        let prediction = Array4::from_shape_fn((1, 1, side, side), |(_, _, y, _)| {
            if (2..6).contains(&y) {
                1.0
            } else {
                0.0
            }
        });
        let placement = Placement {
            x: 0,
            y: 2,
            width: 8,
            height: 4,
        };

        let mask = postprocess_mask(prediction, 8, placement, 16, 8)?;
        assert_eq!(mask.dimensions(), (16, 8));
        assert!(mask.pixels().all(|p| (p[0] - 1.0).abs() < 1e-3));
        Ok(())
    }

    #[test]
    fn test_postprocess_rejects_short_output() {
        let prediction = Array4::<f32>::zeros((1, 1, 2, 2));
        let placement = Placement {
            x: 0,
            y: 0,
            width: 4,
            height: 4,
        };
        assert!(postprocess_mask(prediction, 4, placement, 4, 4).is_err());
    }

    #[test]
    fn test_model_paths() {
        let remover = OnnxRemover::new("/models", 0);
        assert_eq!(
            remover.model_path(QualityModel::Fast),
            PathBuf::from("/models/isnet_quint8.onnx")
        );
        assert_eq!(
            remover.model_path(QualityModel::Max),
            PathBuf::from("/models/isnet_fp16.onnx")
        );
    }

    #[tokio::test]
    async fn test_missing_model_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let remover = OnnxRemover::new(dir.path(), 0);
        let png = crate::mocks::solid_png(4, 4, [1, 2, 3, 255]).unwrap();
        let source = SourceImage::new("a.png", "image/png", png);
        let mut ticks = Vec::new();

        let result = remover
            .remove_background(&source, &QualitySettings::default(), &mut |label, d, t| {
                ticks.push((label.to_string(), d, t))
            })
            .await;

        assert!(matches!(result, Err(RetouchError::Model { .. })));
        assert_eq!(ticks, vec![("decode".to_string(), 1, 4)]);
    }
}
