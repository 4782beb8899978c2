//! Weight prediction engine

mod combiner;
mod heuristic;
mod onnx;
mod tracker;
mod weights;

pub use combiner::EnsembleCombiner;
pub use heuristic::{
    CompositeHeuristicPredictor, DepthCuePredictor, MetalDetectorPredictor, ShapeProfilePredictor,
};
pub use onnx::OnnxWeightPredictor;
pub use tracker::PerformanceTracker;
pub use weights::EnsembleWeightCalculator;

use crate::error::PredictorError;
use crate::models::{ImageCharacteristics, ModelPrediction, PixelBuffer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Specialization of a predictor, used for default weighting and
/// characteristic-driven boosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictorRole {
    /// Object/metal detection driven estimation
    Detector,
    /// Depth-cue driven estimation
    Depth,
    /// Shape/geometry driven estimation
    Shape,
    /// Combined-signal estimation (model-backed or composite)
    Ensemble,
}

/// Processed inputs handed to every predictor for one estimate
#[derive(Debug, Clone)]
pub struct PredictorInput {
    /// Contrast-enhanced, lighting-normalized primary frame
    pub model_frame: PixelBuffer,
    /// Raw auxiliary frame
    pub aux_frame: PixelBuffer,
    /// Edge map of the auxiliary frame
    pub edge_frame: PixelBuffer,
    pub characteristics: ImageCharacteristics,
    /// Opaque material selector from the host, forwarded untouched
    pub material_type: Option<String>,
}

/// Contract every predictor satisfies, regardless of whether it is
/// heuristic, learned, or remote.
///
/// Adapters are independent and stateless from the pipeline's point of view;
/// the engine bounds each call with a timeout and treats a failure or
/// timeout as excluding that predictor from the current combination only.
#[async_trait]
pub trait WeightPredictor: Send + Sync {
    /// Stable identifier reported in results and telemetry
    fn id(&self) -> &str;

    /// Role used for default weighting
    fn role(&self) -> PredictorRole;

    /// Produce one prediction for the given input
    async fn predict(&self, input: &PredictorInput) -> Result<ModelPrediction, PredictorError>;
}
