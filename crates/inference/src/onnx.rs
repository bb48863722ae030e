//! ONNX runtime backend built on tract.
//!
//! The graph is loaded once, specialised to a fixed `(1, H, W, 3)` input,
//! optimised and turned into a runnable plan. Plans are immutable, so one
//! backend serves concurrent forward passes.

use crate::model::{input_shape_for, BackendDescription, ClassifierBackend};
use crate::preprocess::{ImageTensor, CHANNELS};
use dermalens_shared::error::{DermalensError, Result};
use std::fmt;
use std::path::Path;
use tract_onnx::pb;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Classifier backend running an ONNX graph on the CPU
pub struct OnnxBackend {
    plan: OnnxPlan,
    description: BackendDescription,
}

impl fmt::Debug for OnnxBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxBackend")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl OnnxBackend {
    /// Loads and optimises the graph at `path`
    ///
    /// The first graph input is pinned to `f32[1, H, W, 3]`; the first output
    /// must hold exactly `label_count` values.
    pub fn load(path: &Path, image_size: (u32, u32), label_count: usize) -> Result<Self> {
        let model_path = path.display().to_string();

        if !path.is_file() {
            return Err(DermalensError::model_load(
                model_path,
                "model file not found",
                None,
            ));
        }

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| load_error(&model_path, e))?;
        Self::from_inference_model(model, &model_path, image_size, label_count)
    }

    /// Builds a backend from an already decoded ONNX protobuf
    ///
    /// `source` only labels log lines and errors. Applies the same input pin
    /// and output checks as [`load`](Self::load).
    pub fn from_proto(
        proto: &pb::ModelProto,
        source: &str,
        image_size: (u32, u32),
        label_count: usize,
    ) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_proto_model(proto)
            .map_err(|e| load_error(source, e))?;
        Self::from_inference_model(model, source, image_size, label_count)
    }

    fn from_inference_model(
        model: InferenceModel,
        source: &str,
        image_size: (u32, u32),
        label_count: usize,
    ) -> Result<Self> {
        let input_shape = input_shape_for(image_size);
        let typed = model
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, input_shape[1], input_shape[2], CHANNELS),
                ),
            )
            .and_then(|model| model.into_typed())
            .and_then(|model| model.into_decluttered())
            .map_err(|e| load_error(source, e))?;

        let output_shape = typed
            .output_fact(0)
            .map_err(|e| load_error(source, e))?
            .shape
            .as_concrete()
            .map(<[usize]>::to_vec)
            .ok_or_else(|| {
                DermalensError::model_load(source, "model output shape is not static", None)
            })?;

        let output_len: usize = output_shape.iter().product();
        if output_len != label_count || output_shape.last() != Some(&label_count) {
            return Err(DermalensError::model_load(
                source,
                format!(
                    "model output shape {:?} does not match {} labels",
                    output_shape, label_count
                ),
                None,
            ));
        }

        let total_params = count_parameters(&typed);
        let layers = typed.nodes().iter().filter(|n| !n.inputs.is_empty()).count();
        if total_params == 0 {
            warn!(model_path = %source, "Model graph carries no constant weights");
        }

        let plan = typed
            .into_optimized()
            .and_then(|model| model.into_runnable())
            .map_err(|e| load_error(source, e))?;

        debug!(
            model_path = %source,
            ?input_shape,
            ?output_shape,
            total_params,
            layers,
            "ONNX plan ready"
        );

        Ok(Self {
            plan,
            description: BackendDescription {
                input_shape,
                output_shape,
                total_params,
                layers,
            },
        })
    }
}

fn load_error(source: &str, e: TractError) -> DermalensError {
    DermalensError::model_load(source, format!("{:#}", e), Some(e.into()))
}

/// Sums the element counts of every constant tensor left after decluttering
///
/// Constants folded out of the graph (shape scalars, fused biases) count too,
/// so this is close to but not exactly the initializer count.
fn count_parameters(model: &TypedModel) -> u64 {
    model
        .nodes()
        .iter()
        .filter(|n| n.inputs.is_empty())
        .filter_map(|n| n.outputs.first().and_then(|o| o.fact.konst.as_ref()))
        .map(|t| t.len() as u64)
        .sum()
}

impl ClassifierBackend for OnnxBackend {
    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let runtime_error =
            |e: TractError| DermalensError::inference(format!("{:#}", e), Some(e.into()));

        let tensor = Tensor::from_shape(&input.shape(), input.data()).map_err(runtime_error)?;
        let outputs = self.plan.run(tvec!(tensor.into())).map_err(runtime_error)?;
        let output = outputs
            .first()
            .ok_or_else(|| DermalensError::inference("model returned no outputs", None))?;
        let view = output.to_array_view::<f32>().map_err(runtime_error)?;

        Ok(view.iter().copied().collect())
    }

    fn describe(&self) -> BackendDescription {
        self.description.clone()
    }
}
