use anyhow::{Context, Result};
use burn::{
    config::Config,
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::Module,
    nn::loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        cast::ToElement,
        Distribution, Int, Tensor,
    },
};
use std::{path::Path, sync::Arc};
use tracing::{info, warn};

use crate::{
    data::{Cifar10Dataset, GanBatch, GanBatcher},
    model::{
        discriminator::{Discriminator, DiscriminatorRecord},
        generator::{Generator, GeneratorRecord},
        ModelConfig,
    },
    utils::{normalize_for_save, save_image},
};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub optimizer: AdamConfig,
    /// Directory holding (or receiving) the CIFAR-10 binary distribution.
    pub data_root: String,
    /// Directory receiving sample grids, the config and the trained records.
    pub outdir: String,

    #[config(default = 25)]
    pub epochs: usize,
    #[config(default = 64)]
    pub batch_size: usize,
    #[config(default = 64)]
    pub image_size: usize,
    #[config(default = 2e-4)]
    pub lr: f64,
    #[config(default = 2)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    /// Write sample grids every `sample_interval` batches.
    #[config(default = 100)]
    pub sample_interval: usize,
    /// Continue from the records in `outdir` when they exist.
    #[config(default = false)]
    pub resume: bool,
    /// Optional smoothing applied to the BCE targets.
    pub label_smoothing: Option<f32>,
}

// ////////////////////////////////////////////////////////////////////////////
// Losses

/// Discriminator loss on a real batch and a freshly generated one. The fake
/// batch is detached so the generator receives no gradients from this step.
fn calc_disc_loss<B: AutodiffBackend>(
    batch: &GanBatch<B>,
    noise: Tensor<B, 4>,
    generator: &Generator<B>,
    discriminator: &Discriminator<B>,
    bce: &BinaryCrossEntropyLoss<B>,
) -> Tensor<B, 1> {
    let fake_images = generator.forward(noise).detach();

    let real_out = discriminator.forward(batch.images.clone());
    let real_targets = Tensor::<B, 2, Int>::ones([batch.size, 1], &real_out.device());
    let real_loss = bce.forward(real_out, real_targets);

    let fake_out = discriminator.forward(fake_images);
    let fake_targets = Tensor::<B, 2, Int>::zeros([batch.size, 1], &fake_out.device());
    let fake_loss = bce.forward(fake_out, fake_targets);

    real_loss + fake_loss
}

/// Generator loss against the discriminator's judgment of a generated batch,
/// this time keeping the graph. Also returns the images for sampling.
fn calc_gen_loss<B: AutodiffBackend>(
    noise: Tensor<B, 4>,
    generator: &Generator<B>,
    discriminator: &Discriminator<B>,
    bce: &BinaryCrossEntropyLoss<B>,
) -> (Tensor<B, 1>, Tensor<B, 4>) {
    let fake_images = generator.forward(noise);

    let out = discriminator.forward(fake_images.clone());
    let size = out.dims()[0];
    let targets = Tensor::<B, 2, Int>::ones([size, 1], &out.device());
    let loss = bce.forward(out, targets);

    (loss, fake_images)
}

// ////////////////////////////////////////////////////////////////////////////
// Training

pub fn train<B: AutodiffBackend>(
    config: TrainingConfig,
    device: &B::Device,
) -> Result<Generator<B>> {
    std::fs::create_dir_all(&config.outdir)
        .with_context(|| format!("failed to create {}", config.outdir))?;
    config
        .save(format!("{}/config.json", config.outdir))
        .context("failed to save the training config")?;
    B::seed(config.seed);

    let dataset = Cifar10Dataset::new(&config.data_root)?;
    let dataloader: Arc<dyn DataLoader<B, GanBatch<B>>> =
        DataLoaderBuilder::new(GanBatcher::new(config.image_size))
            .batch_size(config.batch_size)
            .shuffle(config.seed)
            .num_workers(config.num_workers)
            .build(dataset);

    let (mut generator, mut discriminator) = config.model.init::<B>(device);
    let mut gen_optimizer = config.optimizer.init();
    let mut disc_optimizer = config.optimizer.init();

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    if config.resume {
        let gen_path = Path::new(&config.outdir).join("gen.mpk");
        let disc_path = Path::new(&config.outdir).join("disc.mpk");

        if gen_path.exists() && disc_path.exists() {
            info!("continuing from the records in {}", config.outdir);
            let record = recorder
                .load::<GeneratorRecord<B>>(gen_path, device)
                .context("failed to load the generator record")?;
            generator = generator.load_record(record);
            let record = recorder
                .load::<DiscriminatorRecord<B>>(disc_path, device)
                .context("failed to load the discriminator record")?;
            discriminator = discriminator.load_record(record);
        } else {
            warn!("no saved records in {}, starting fresh", config.outdir);
        }
    }

    let bce = BinaryCrossEntropyLossConfig::new()
        .with_smoothing(config.label_smoothing)
        .init(device);

    let latent_dim = config.model.generator.latent_dim;
    let batches = dataloader.num_items().div_ceil(config.batch_size);

    for epoch in 0..config.epochs {
        for (iteration, batch) in dataloader.iter().enumerate() {
            let noise = Tensor::<B, 4>::random(
                [batch.size, latent_dim, 1, 1],
                Distribution::Normal(0.0, 1.0),
                device,
            );

            // update the discriminator on the real and the generated batch
            let disc_loss = calc_disc_loss(&batch, noise.clone(), &generator, &discriminator, &bce);
            let d_loss = disc_loss.clone().into_scalar().to_f32();
            let grads = disc_loss.backward();
            let grads = GradientsParams::from_grads(grads, &discriminator);
            discriminator = disc_optimizer.step(config.lr, discriminator, grads);

            // the same noise goes through again, this time updating the generator
            let (gen_loss, fake_images) =
                calc_gen_loss(noise, &generator, &discriminator, &bce);
            let g_loss = gen_loss.clone().into_scalar().to_f32();
            let grads = gen_loss.backward();
            let grads = GradientsParams::from_grads(grads, &generator);
            generator = gen_optimizer.step(config.lr, generator, grads);

            info!(
                "[Epoch {:2}/{:2}][Batch {:4}/{:4}] D loss: {:+.5}, G loss: {:+.5}",
                epoch, config.epochs, iteration, batches, d_loss, g_loss,
            );

            if iteration % config.sample_interval == 0 {
                save_samples(&batch, fake_images.detach(), epoch, &config.outdir)?;
            }
        }
    }

    recorder
        .record(
            generator.clone().into_record(),
            format!("{}/gen", config.outdir).into(),
        )
        .context("failed to record the generator")?;
    recorder
        .record(
            discriminator.into_record(),
            format!("{}/disc", config.outdir).into(),
        )
        .context("failed to record the discriminator")?;

    Ok(generator)
}

/// Writes the current real batch and the current generated batch as 8x8 PNG
/// grids. The real grid is overwritten each time; the generated one is kept
/// per epoch.
fn save_samples<B: Backend>(
    batch: &GanBatch<B>,
    fake_images: Tensor<B, 4>,
    epoch: usize,
    outdir: &str,
) -> Result<()> {
    // [B, C, H, W] -> [B, H, W, C] for the grid writer
    let real = batch.images.clone().swap_dims(1, 2).swap_dims(2, 3);
    let fake = fake_images.swap_dims(1, 2).swap_dims(2, 3);

    save_image(
        normalize_for_save(real),
        8,
        format!("{outdir}/real_samples.png"),
    )
    .context("failed to write the real sample grid")?;
    save_image(
        normalize_for_save(fake),
        8,
        format!("{outdir}/fake_samples_epoch_{epoch:03}.png"),
    )
    .context("failed to write the generated sample grid")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{discriminator::DiscriminatorConfig, generator::GeneratorConfig};
    use burn::backend::Autodiff;

    type TestAutodiff = Autodiff<crate::TestBackend>;

    fn tiny_pair(
        device: &<TestAutodiff as Backend>::Device,
    ) -> (Generator<TestAutodiff>, Discriminator<TestAutodiff>) {
        (
            GeneratorConfig::new()
                .with_latent_dim(8)
                .with_feature_maps(2)
                .init(device),
            DiscriminatorConfig::new().with_feature_maps(2).init(device),
        )
    }

    fn random_batch(device: &<TestAutodiff as Backend>::Device) -> GanBatch<TestAutodiff> {
        GanBatch {
            images: Tensor::random([2, 3, 64, 64], Distribution::Normal(0.0, 1.0), device),
            size: 2,
        }
    }

    #[test]
    fn adversarial_losses_are_finite() {
        let device = Default::default();
        let (generator, discriminator) = tiny_pair(&device);
        let bce = BinaryCrossEntropyLossConfig::new().init(&device);

        let batch = random_batch(&device);
        let noise = Tensor::random([2, 8, 1, 1], Distribution::Normal(0.0, 1.0), &device);

        let disc_loss = calc_disc_loss(&batch, noise.clone(), &generator, &discriminator, &bce);
        assert!(disc_loss.into_scalar().to_f32().is_finite());

        let (gen_loss, fake_images) = calc_gen_loss(noise, &generator, &discriminator, &bce);
        assert_eq!(fake_images.dims(), [2, 3, 64, 64]);
        assert!(gen_loss.into_scalar().to_f32().is_finite());
    }

    #[test]
    fn discriminator_step_leaves_the_generator_untouched() {
        let device = Default::default();
        let (generator, discriminator) = tiny_pair(&device);
        let bce = BinaryCrossEntropyLossConfig::new().init(&device);

        let batch = random_batch(&device);
        let noise = Tensor::random([2, 8, 1, 1], Distribution::Normal(0.0, 1.0), &device);

        let disc_loss =
            calc_disc_loss(&batch, noise.clone(), &generator, &discriminator, &bce);
        let grads = disc_loss.backward();
        let disc_grads = GradientsParams::from_grads(grads, &discriminator);
        assert!(disc_grads.len() > 0);

        // the fake batch was detached, so no gradients flow into the generator
        let disc_loss = calc_disc_loss(&batch, noise, &generator, &discriminator, &bce);
        let grads = disc_loss.backward();
        let gen_grads = GradientsParams::from_grads(grads, &generator);
        assert_eq!(gen_grads.len(), 0);
    }

    #[test]
    fn generator_step_reaches_the_generator() {
        let device = Default::default();
        let (generator, discriminator) = tiny_pair(&device);
        let bce = BinaryCrossEntropyLossConfig::new().init(&device);

        let noise = Tensor::random([2, 8, 1, 1], Distribution::Normal(0.0, 1.0), &device);
        let (gen_loss, _) = calc_gen_loss(noise, &generator, &discriminator, &bce);
        let grads = gen_loss.backward();

        let gen_grads = GradientsParams::from_grads(grads, &generator);
        assert!(gen_grads.len() > 0);
    }
}
