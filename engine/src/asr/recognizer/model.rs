use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Instant};

use super::config::AsrError;
use super::scorer::Scorer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Tanh,
    Relu,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Self::Tanh => x.tanh(),
            Self::Relu => x.max(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DenseSpec {
    weight: Vec<Vec<f32>>,
    #[serde(default)]
    bias: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ModelSpec {
    #[serde(default)]
    activation: Activation,
    #[serde(default)]
    encoder: Option<DenseSpec>,
    embedding: Vec<Vec<f32>>,
    recurrent: DenseSpec,
    decoder_proj: DenseSpec,
    joint_out: DenseSpec,
}

/// Affine layer `weight · x + bias`, weight laid out as `(out, in)`.
#[derive(Debug, Clone)]
pub struct Dense {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self, AsrError> {
        if bias.len() != weight.nrows() {
            return Err(AsrError::InvalidInput(format!(
                "bias has {} entries but weight has {} rows",
                bias.len(),
                weight.nrows()
            )));
        }
        Ok(Self { weight, bias })
    }

    pub fn in_dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn forward(&self, x: ArrayView1<f32>) -> Array1<f32> {
        self.weight.dot(&x) + &self.bias
    }

    fn from_spec(name: &str, spec: DenseSpec) -> Result<Self, AsrError> {
        let weight = rows_to_array(name, spec.weight)?;
        let bias = match spec.bias {
            Some(b) => Array1::from_vec(b),
            None => Array1::zeros(weight.nrows()),
        };
        Self::new(weight, bias)
            .map_err(|e| AsrError::InvalidInput(format!("layer '{name}': {e}")))
    }
}

fn rows_to_array(name: &str, rows: Vec<Vec<f32>>) -> Result<Array2<f32>, AsrError> {
    let nrows = rows.len();
    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    if nrows == 0 || ncols == 0 {
        return Err(AsrError::InvalidInput(format!("layer '{name}' is empty")));
    }
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(AsrError::InvalidInput(format!(
            "layer '{name}' has ragged rows"
        )));
    }
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((nrows, ncols), flat)?)
}

/// Numerically stable log-softmax.
pub fn log_softmax(logits: ArrayView1<f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    if !max.is_finite() {
        return logits.to_owned();
    }
    let log_sum = logits.mapv(|v| (v - max).exp()).sum().ln() + max;
    logits.mapv(|v| v - log_sum)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub encoder_calls: usize,
    pub decoder_calls: usize,
    pub joint_calls: usize,
}

/// Small dense transducer: affine encoder, tanh-recurrent prediction network
/// seeded with the blank symbol, and an additive joiner.
#[derive(Debug, Clone)]
pub struct TransducerModel {
    encoder: Option<Dense>,
    embedding: Array2<f32>,
    recurrent: Dense,
    decoder_proj: Dense,
    joint_out: Dense,
    activation: Activation,
    stats: NetworkStats,
}

impl Drop for TransducerModel {
    fn drop(&mut self) {
        log::debug!("Dropping transducer model ({:?})", self.stats);
    }
}

impl TransducerModel {
    pub fn new(
        encoder: Option<Dense>,
        embedding: Array2<f32>,
        recurrent: Dense,
        decoder_proj: Dense,
        joint_out: Dense,
        activation: Activation,
    ) -> Result<Self, AsrError> {
        let vocab_size = joint_out.out_dim();
        let hidden = embedding.ncols();
        let joint_dim = joint_out.in_dim();

        if vocab_size < 2 {
            return Err(AsrError::InvalidInput(
                "vocabulary must hold at least one label and the blank".into(),
            ));
        }
        if embedding.nrows() != vocab_size {
            return Err(AsrError::InvalidInput(format!(
                "embedding has {} rows, joiner emits {vocab_size} classes",
                embedding.nrows()
            )));
        }
        if recurrent.in_dim() != hidden || recurrent.out_dim() != hidden {
            return Err(AsrError::InvalidInput(format!(
                "recurrent layer must be {hidden}x{hidden}"
            )));
        }
        if decoder_proj.in_dim() != hidden || decoder_proj.out_dim() != joint_dim {
            return Err(AsrError::InvalidInput(format!(
                "decoder projection must map {hidden} -> {joint_dim}"
            )));
        }
        if let Some(enc) = &encoder {
            if enc.out_dim() != joint_dim {
                return Err(AsrError::InvalidInput(format!(
                    "encoder projects to {}, joiner expects {joint_dim}",
                    enc.out_dim()
                )));
            }
        }

        Ok(Self {
            encoder,
            embedding,
            recurrent,
            decoder_proj,
            joint_out,
            activation,
            stats: NetworkStats::default(),
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AsrError> {
        let start = Instant::now();
        let content = fs::read_to_string(path.as_ref())?;
        let model = Self::from_json(&content)?;
        log::info!(
            "Transducer model loaded from {} in {:?} (vocab={}, joint_dim={})",
            path.as_ref().display(),
            start.elapsed(),
            model.vocab_size(),
            model.joint_dim()
        );
        Ok(model)
    }

    pub fn from_json(json: &str) -> Result<Self, AsrError> {
        let spec: ModelSpec = serde_json::from_str(json)?;
        let encoder = spec
            .encoder
            .map(|e| Dense::from_spec("encoder", e))
            .transpose()?;
        Self::new(
            encoder,
            rows_to_array("embedding", spec.embedding)?,
            Dense::from_spec("recurrent", spec.recurrent)?,
            Dense::from_spec("decoder_proj", spec.decoder_proj)?,
            Dense::from_spec("joint_out", spec.joint_out)?,
            spec.activation,
        )
    }

    pub fn joint_dim(&self) -> usize {
        self.joint_out.in_dim()
    }

    pub fn input_dim(&self) -> usize {
        self.encoder
            .as_ref()
            .map(Dense::in_dim)
            .unwrap_or_else(|| self.joint_dim())
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    fn embed(&self, token: i32) -> Result<ArrayView1<'_, f32>, AsrError> {
        usize::try_from(token)
            .ok()
            .filter(|&t| t < self.embedding.nrows())
            .map(|t| self.embedding.index_axis(Axis(0), t))
            .ok_or_else(|| AsrError::InvalidInput(format!("label {token} is out of vocabulary")))
    }
}

impl Scorer for TransducerModel {
    fn vocab_size(&self) -> usize {
        self.joint_out.out_dim()
    }

    fn encode(&mut self, frames: ArrayView2<f32>) -> Result<Array2<f32>, AsrError> {
        if frames.nrows() == 0 {
            return Err(AsrError::InvalidInput("utterance has no frames".into()));
        }
        if frames.ncols() != self.input_dim() {
            return Err(AsrError::InvalidInput(format!(
                "frames have {} features, model expects {}",
                frames.ncols(),
                self.input_dim()
            )));
        }
        self.stats.encoder_calls += 1;
        let encoded = match &self.encoder {
            Some(enc) => frames.dot(&enc.weight.t()) + &enc.bias,
            None => frames.to_owned(),
        };
        Ok(encoded)
    }

    fn decoder_step(&mut self, prefix: &[i32]) -> Result<Array1<f32>, AsrError> {
        self.stats.decoder_calls += 1;
        let blank = self.blank_idx();
        let mut hidden = self.embed(blank)?.mapv(f32::tanh);
        for &token in prefix {
            if token == blank {
                return Err(AsrError::InvalidInput(
                    "blank cannot appear in a label history".into(),
                ));
            }
            let pre = self.recurrent.forward(hidden.view()) + &self.embed(token)?;
            hidden = pre.mapv(f32::tanh);
        }
        Ok(self.decoder_proj.forward(hidden.view()))
    }

    fn joint(
        &mut self,
        encoder_frame: ArrayView1<f32>,
        decoder_output: ArrayView1<f32>,
    ) -> Result<Array1<f32>, AsrError> {
        let dim = self.joint_dim();
        if encoder_frame.len() != dim || decoder_output.len() != dim {
            return Err(AsrError::InvalidInput(format!(
                "joiner expects {dim}-dim inputs, got encoder {} and decoder {}",
                encoder_frame.len(),
                decoder_output.len()
            )));
        }
        self.stats.joint_calls += 1;
        let act = self.activation;
        let hidden = (&encoder_frame + &decoder_output).mapv(|v| act.apply(v));
        let logits = self.joint_out.forward(hidden.view());
        Ok(log_softmax(logits.view()))
    }
}
