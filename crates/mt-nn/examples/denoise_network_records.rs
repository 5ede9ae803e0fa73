// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Trains a small denoising autoencoder on synthetic traffic records and
//! round-trips the result through a quantized artifact.

use mt_nn::{
    export, synthetic_dataset, ExportOptions, Modality, NnResult, Quantization, TrainConfig,
    Trainer,
};

fn main() -> NnResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = TrainConfig::new(Modality::Network);
    config.input_shape = Some(vec![40]);
    config.latent_dim = 16;
    config.epochs = 10;
    config.batch_size = 8;

    let samples = synthetic_dataset(&config.autoencoder_config(), 64, 7)?;
    let trainer = Trainer::new(config)?;
    let report = trainer.train(&samples)?;
    println!(
        "final loss {:.6}, validation {:.6}",
        report.history.final_loss().unwrap_or(f32::NAN),
        report.history.final_val_loss().unwrap_or(f32::NAN),
    );

    let dir = std::env::temp_dir().join("modaltorch-demo");
    let path = dir.join("network.mtpa");
    let options = ExportOptions {
        quantization: Quantization::Affine8,
    };
    let bytes = export(&report.model, &path, &options)?;
    println!("exported {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
