//! Modality-adaptive denoising autoencoders built on ModalTorch primitives.
//!
//! This crate offers a lightweight `nn.Module` style surface that keeps the
//! stack entirely in Rust: one autoencoder abstraction whose internal
//! topology adapts to the sensing modality (imagery, network records,
//! volumetric range scans, audio) while its external contract stays uniform
//! (fixed input shape in, same-shape reconstruction out, fixed-width latent
//! bottleneck in between). Trained models are persisted whole and can be
//! converted into portable, optionally quantized inference artifacts.

pub mod dataset;
pub mod error;
pub mod export;
pub mod io;
pub mod layers;
pub mod loss;
pub mod model;
pub mod module;
pub mod noise;
pub mod preprocess;
pub mod trainer;

pub use dataset::{BatchIter, DataLoader, Dataset};
pub use error::{NnError, NnResult};
pub use export::{
    export, export_from_snapshot, import, ExportOptions, PortableArtifact, Quantization,
};
pub use io::{
    load_snapshot, load_snapshot_json, save_snapshot, save_snapshot_json, ModelSnapshot,
};
pub use layers::conv::{Conv2d, ConvTranspose2d, MaxPool2d};
pub use layers::conv3d::{Conv3d, ConvTranspose3d, MaxPool3d};
pub use layers::linear::Linear;
pub use layers::recurrent::{Lstm, RecurrentDecoder, RecurrentEncoder};
pub use layers::sequential::Sequential;
pub use layers::{Relu, Sigmoid};
pub use loss::{Loss, MeanSquaredError};
pub use model::{
    AutoencoderConfig, FitConfig, Modality, ModalityAutoencoder, TrainingHistory,
    DEFAULT_LATENT_DIM,
};
pub use module::{Module, Parameter};
pub use noise::{GaussianNoise, DEFAULT_NOISE_FACTOR};
pub use preprocess::{AudioPipeline, ImagePipeline, LidarPipeline, NetworkPipeline};
pub use trainer::{synthetic_dataset, TrainConfig, TrainReport, Trainer};

pub use mt_tensor::{Tensor, TensorError, TensorResult};
