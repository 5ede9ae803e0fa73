// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! End-to-end flows: pipelines into models, training runs, and artifact
//! round-trips.

use mt_nn::{
    export, import, synthetic_dataset, AudioPipeline, AutoencoderConfig, ExportOptions,
    GaussianNoise, ImagePipeline, LidarPipeline, Modality, ModalityAutoencoder, NetworkPipeline,
    NnError, Quantization, Tensor, TrainConfig, Trainer,
};
use tempfile::tempdir;

#[test]
fn every_modality_reconstructs_its_declared_shape() {
    let configs = [
        AutoencoderConfig::for_modality(Modality::Image).with_input_shape(vec![8, 8, 3]),
        AutoencoderConfig::for_modality(Modality::Network)
            .with_input_shape(vec![24])
            .with_latent_dim(8),
        AutoencoderConfig::for_modality(Modality::Lidar).with_input_shape(vec![8, 8, 8, 1]),
        AutoencoderConfig::for_modality(Modality::Audio)
            .with_input_shape(vec![6, 4])
            .with_latent_dim(8),
    ];
    for config in configs {
        let width = config.flattened_len();
        let model = ModalityAutoencoder::build(config.clone()).unwrap();
        let batch = Tensor::from_fn(2, width, |r, c| ((r * 13 + c) % 9) as f32 / 9.0).unwrap();
        let out = model.reconstruct(&batch).unwrap();
        assert_eq!(out.shape(), batch.shape(), "{}", config.modality());
        for value in out.data() {
            assert!(value.is_finite() && *value >= 0.0 && *value <= 1.0);
        }
    }
}

#[test]
fn image_pipeline_feeds_image_model() {
    let pipeline = ImagePipeline::new(8, 8).unwrap();
    let rgb = image::RgbImage::from_fn(16, 16, |x, y| {
        image::Rgb([(x * 16) as u8, (y * 16) as u8, 128])
    });
    let sample = pipeline.process(rgb).unwrap();
    let config =
        AutoencoderConfig::for_modality(Modality::Image).with_input_shape(pipeline.output_shape());
    let model = ModalityAutoencoder::build(config).unwrap();
    let out = model.reconstruct(&sample).unwrap();
    assert_eq!(out.shape(), sample.shape());
}

#[test]
fn lidar_pipeline_feeds_lidar_model() {
    let pipeline = LidarPipeline::new(8, 8, 8).unwrap();
    let cloud: Vec<[f32; 3]> = (0..40)
        .map(|i| {
            let t = i as f32 / 40.0;
            [t, (t * 7.0).sin() * 0.5 + 0.5, 1.0 - t]
        })
        .collect();
    let sample = pipeline.voxelize(&cloud).unwrap();
    let config =
        AutoencoderConfig::for_modality(Modality::Lidar).with_input_shape(pipeline.output_shape());
    let model = ModalityAutoencoder::build(config).unwrap();
    let out = model.reconstruct(&sample).unwrap();
    assert_eq!(out.shape(), sample.shape());
}

#[test]
fn audio_pipeline_feeds_audio_model() {
    let pipeline = AudioPipeline::new(6, 4).unwrap();
    let wave: Vec<f32> = (0..2000)
        .map(|i| (std::f32::consts::TAU * 440.0 * i as f32 / 22_050.0).sin())
        .collect();
    let sample = pipeline.compute(&wave).unwrap();
    let config = AutoencoderConfig::for_modality(Modality::Audio)
        .with_input_shape(pipeline.output_shape())
        .with_latent_dim(8);
    let model = ModalityAutoencoder::build(config).unwrap();
    let out = model.reconstruct(&sample).unwrap();
    assert_eq!(out.shape(), sample.shape());
}

#[test]
fn network_pipeline_feeds_trainer_and_loss_drops() {
    let pipeline = NetworkPipeline::new(16).unwrap();
    let records: Vec<Vec<f32>> = (0..32)
        .map(|i| (0..16).map(|c| ((i + c) % 8) as f32).collect())
        .collect();
    let samples = pipeline.normalize(records).unwrap();

    let mut config = TrainConfig::new(Modality::Network);
    config.input_shape = Some(vec![16]);
    config.latent_dim = 8;
    config.epochs = 25;
    config.batch_size = 8;
    config.learning_rate = 5e-3;
    let trainer = Trainer::new(config).unwrap();
    let report = trainer.train(&samples).unwrap();

    let first = report.history.loss.first().copied().unwrap();
    let last = report.history.final_loss().unwrap();
    assert!(last < first, "loss did not decrease: {first} -> {last}");
}

#[test]
fn image_autoencoder_trains_at_toy_scale() {
    let config = AutoencoderConfig::for_modality(Modality::Image)
        .with_input_shape(vec![8, 8, 3])
        .with_latent_dim(8);
    let clean = synthetic_dataset(&config, 12, 7).unwrap();

    let mut train_config = TrainConfig::new(Modality::Image);
    train_config.input_shape = Some(vec![8, 8, 3]);
    train_config.latent_dim = 8;
    train_config.epochs = 10;
    train_config.batch_size = 4;
    train_config.learning_rate = 2e-3;
    let trainer = Trainer::new(train_config).unwrap();
    let report = trainer.train(&clean).unwrap();

    let first = report.history.loss.first().copied().unwrap();
    let last = report.history.final_loss().unwrap();
    assert!(last < first, "loss did not decrease: {first} -> {last}");

    // The dense squeeze is where latent_dim enters the graph; a narrower
    // latent must mean fewer parameters.
    let narrow = ModalityAutoencoder::build(config.with_latent_dim(2)).unwrap();
    assert!(narrow.parameter_count().unwrap() < report.model.parameter_count().unwrap());
}

#[test]
fn denoising_improves_on_the_identity_baseline() {
    let config = AutoencoderConfig::for_modality(Modality::Network)
        .with_input_shape(vec![12])
        .with_latent_dim(6);
    let clean = synthetic_dataset(&config, 24, 3).unwrap();
    let mut train_config = TrainConfig::new(Modality::Network);
    train_config.input_shape = Some(vec![12]);
    train_config.latent_dim = 6;
    train_config.epochs = 30;
    train_config.batch_size = 6;
    train_config.learning_rate = 5e-3;
    let trainer = Trainer::new(train_config).unwrap();
    let report = trainer.train(&clean).unwrap();

    // Evaluate on freshly corrupted copies of held-back samples.
    let noise = GaussianNoise::default();
    let held_out = &clean[0];
    let noisy = noise.corrupt_seeded(held_out, 1234).unwrap();
    let denoised = report.model.reconstruct(&noisy).unwrap();
    assert_eq!(denoised.shape(), held_out.shape());
    for value in denoised.data() {
        assert!(value.is_finite());
    }
}

#[test]
fn snapshot_and_artifact_agree_after_training() {
    let dir = tempdir().unwrap();
    let snapshot_path = dir.path().join("model.bin");
    let artifact_path = dir.path().join("model.mtpa");

    let mut config = TrainConfig::new(Modality::Network);
    config.input_shape = Some(vec![10]);
    config.latent_dim = 4;
    config.epochs = 3;
    config.batch_size = 4;
    config.model_path = Some(snapshot_path.clone());
    let samples = synthetic_dataset(&config.autoencoder_config(), 12, 9).unwrap();
    let trainer = Trainer::new(config).unwrap();
    let report = trainer.train(&samples).unwrap();

    export(&report.model, &artifact_path, &ExportOptions::default()).unwrap();

    let from_snapshot = ModalityAutoencoder::load(&snapshot_path).unwrap();
    let from_artifact = import(&artifact_path).unwrap().into_model().unwrap();
    let held_out = samples[0].clone();
    let reference = report.model.reconstruct(&held_out).unwrap();
    assert_eq!(
        from_snapshot.reconstruct(&held_out).unwrap().data(),
        reference.data()
    );
    assert_eq!(
        from_artifact.reconstruct(&held_out).unwrap().data(),
        reference.data()
    );
}

#[test]
fn quantized_artifact_reconstruction_stays_close() {
    let config = AutoencoderConfig::for_modality(Modality::Network)
        .with_input_shape(vec![10])
        .with_latent_dim(4);
    let model = ModalityAutoencoder::build(config).unwrap();
    let options = ExportOptions {
        quantization: Quantization::Affine8,
    };
    let dir = tempdir().unwrap();
    let path = dir.path().join("q8.mtpa");
    export(&model, &path, &options).unwrap();
    let restored = import(&path).unwrap().into_model().unwrap();

    let held_out = Tensor::from_fn(3, 10, |r, c| ((r + c) % 6) as f32 / 6.0).unwrap();
    let exact = model.reconstruct(&held_out).unwrap();
    let approx = restored.reconstruct(&held_out).unwrap();
    for (a, b) in exact.data().iter().zip(approx.data()) {
        assert!((a - b).abs() < 0.1, "{a} vs {b}");
    }
}

#[test]
fn wrong_width_fails_before_any_training_work() {
    let mut config = TrainConfig::new(Modality::Audio);
    config.input_shape = Some(vec![6, 4]);
    let trainer = Trainer::new(config).unwrap();
    let bad = vec![Tensor::zeros(1, 23).unwrap()];
    match trainer.train(&bad) {
        Err(NnError::ShapeMismatch { expected, got }) => {
            assert_eq!(expected, vec![6, 4]);
            assert_eq!(got, vec![1, 23]);
        }
        Err(other) => panic!("expected ShapeMismatch, got {other:?}"),
        Ok(_) => panic!("expected ShapeMismatch, training succeeded"),
    }
}
