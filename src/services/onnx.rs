//! Local sentence-embedding model running on ONNX Runtime.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{ArrayViewD, Ix2, Ix3};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};
use tracing::info;

use super::embedding::EmbeddingBackend;
use super::vector_index::normalize;
use crate::error::ModelError;
use crate::models::EmbeddingConfig;

/// Sentence-transformer style model: token embeddings are mean-pooled and L2-normalized.
///
/// Inference runs on tokio's blocking pool so the runtime stays responsive.
pub struct OnnxEmbeddingBackend {
    model: Arc<OnnxModel>,
    model_id: String,
}

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
    uses_token_type_ids: bool,
}

impl OnnxEmbeddingBackend {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, ModelError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(ModelError::NotFound(format!(
                "model not found: {}",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(ModelError::NotFound(format!(
                "tokenizer not found: {}",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?;

        let uses_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens as usize,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        info!(model = %config.model_id, path = %model_dir.display(), "loaded embedding model");

        Ok(Self {
            model: Arc::new(OnnxModel {
                session: Mutex::new(session),
                tokenizer,
                dimension: config.dimension as usize,
                uses_token_type_ids,
            }),
            model_id: config.model_id.clone(),
        })
    }
}

impl OnnxModel {
    fn embed_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();
            for j in 0..ids.len() {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
                token_type_ids[i * max_len + j] = types.get(j).copied().unwrap_or(0) as i64;
            }
        }

        let shape = [batch_size, max_len];
        let input_ids_tensor = Tensor::from_array((shape, input_ids))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array((shape, attention_mask.clone()))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = if self.uses_token_type_ids {
            let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
                .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
        }
        .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        pool_output(output, &attention_mask, max_len, self.dimension)
    }
}

/// Turn model output into one normalized vector per input.
///
/// 3-D output is token embeddings and is mean-pooled over the attention mask;
/// 2-D output is already pooled.
fn pool_output(
    output: ArrayViewD<'_, f32>,
    attention_mask: &[i64],
    max_len: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, ModelError> {
    let shape = output.shape().to_vec();
    let width = *shape.last().unwrap_or(&0);
    if width != dimension {
        return Err(ModelError::DimensionMismatch {
            expected: dimension,
            actual: width,
        });
    }

    match shape.len() {
        3 => {
            let tokens = output
                .into_dimensionality::<Ix3>()
                .map_err(|e| ModelError::InferenceError(e.to_string()))?;
            Ok((0..shape[0])
                .map(|i| {
                    let mut pooled = vec![0.0f32; dimension];
                    let mut count = 0.0f32;
                    for j in 0..shape[1].min(max_len) {
                        if attention_mask[i * max_len + j] == 0 {
                            continue;
                        }
                        count += 1.0;
                        for (d, value) in pooled.iter_mut().enumerate() {
                            *value += tokens[[i, j, d]];
                        }
                    }
                    if count > 0.0 {
                        pooled.iter_mut().for_each(|v| *v /= count);
                    }
                    normalize(&pooled)
                })
                .collect())
        }
        2 => {
            let pooled = output
                .into_dimensionality::<Ix2>()
                .map_err(|e| ModelError::InferenceError(e.to_string()))?;
            Ok(pooled
                .rows()
                .into_iter()
                .map(|row| normalize(&row.to_vec()))
                .collect())
        }
        _ => Err(ModelError::InferenceError(format!(
            "unexpected output shape: {:?}",
            shape
        ))),
    }
}

#[async_trait]
impl EmbeddingBackend for OnnxEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        run_blocking(move || model.embed_sync(&texts)).await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.model.dimension
    }
}

/// Run CPU-bound model work off the async worker threads.
async fn run_blocking<T, F>(work: F) -> Result<T, ModelError>
where
    F: FnOnce() -> Result<T, ModelError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ModelError::InferenceError(format!("inference task failed: {e}")))?
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn test_mean_pooling_ignores_padding() {
        // batch 1, 3 tokens (last is padding), dimension 2
        let tokens = Array3::from_shape_vec((1, 3, 2), vec![1.0, 0.0, 3.0, 0.0, 100.0, 100.0])
            .unwrap()
            .into_dyn();
        let mask = vec![1, 1, 0];

        let pooled = pool_output(tokens.view(), &mask, 3, 2).unwrap();
        assert_eq!(pooled, vec![vec![1.0, 0.0]]);
    }

    #[test]
    fn test_pooled_output_is_normalized() {
        let pooled = Array2::from_shape_vec((1, 2), vec![3.0, 4.0])
            .unwrap()
            .into_dyn();
        let vectors = pool_output(pooled.view(), &[1], 1, 2).unwrap();
        assert!((vectors[0][0] - 0.6).abs() < 1e-6);
        assert!((vectors[0][1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_output_width_must_match_dimension() {
        let pooled = Array2::<f32>::zeros((1, 5)).into_dyn();
        let result = pool_output(pooled.view(), &[1], 1, 384);
        assert!(matches!(
            result,
            Err(ModelError::DimensionMismatch {
                expected: 384,
                actual: 5
            })
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_inference_does_not_block_runtime() {
        let slow = run_blocking(|| {
            std::thread::sleep(std::time::Duration::from_millis(500));
            Ok(())
        });

        // A single-threaded runtime can only fire the timer if the work is off-thread
        tokio::select! {
            biased;
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
            _ = slow => panic!("blocking work finished before the timer"),
        }
    }

    #[tokio::test]
    async fn test_blocking_panic_becomes_inference_error() {
        let result: Result<(), _> = run_blocking(|| panic!("boom")).await;
        assert!(matches!(result, Err(ModelError::InferenceError(_))));
    }

    #[test]
    fn test_load_missing_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = OnnxEmbeddingBackend::load(&EmbeddingConfig::default(), dir.path());
        assert!(matches!(result, Err(ModelError::NotFound(_))));
    }
}
