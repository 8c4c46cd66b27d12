#![recursion_limit = "256"]

use anyhow::Result;
use burn::{
    optim::AdamConfig,
    tensor::{Distribution, Tensor},
};
use tracing::info;

use dcgan::{
    model::{discriminator::DiscriminatorConfig, generator::GeneratorConfig, ModelConfig},
    training::{train, TrainingConfig},
    utils::{normalize_for_save, save_image},
};

#[cfg(feature = "ndarray")]
type TrainBackend = burn::backend::NdArray<f32>;
#[cfg(not(feature = "ndarray"))]
type TrainBackend = burn::backend::Wgpu<f32>;

type AutodiffTrainBackend = burn::backend::Autodiff<TrainBackend>;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    #[cfg(feature = "ndarray")]
    let device = burn::backend::ndarray::NdArrayDevice::default();
    #[cfg(not(feature = "ndarray"))]
    let device = burn::backend::wgpu::WgpuDevice::default();

    let generator_config = GeneratorConfig::new();
    let latent_dim = generator_config.latent_dim;

    let model = ModelConfig::new(generator_config, DiscriminatorConfig::new());
    let optimizer = AdamConfig::new().with_beta_1(0.5).with_beta_2(0.999);
    let config = TrainingConfig::new(model, optimizer, "./data".into(), "./results".into());
    let outdir = config.outdir.clone();

    let generator = train::<AutodiffTrainBackend>(config, &device)?;

    // Draw fresh noise and keep a grid of what the trained generator makes of it.
    let noise = Tensor::<AutodiffTrainBackend, 4>::random(
        [64, latent_dim, 1, 1],
        Distribution::Normal(0.0, 1.0),
        &device,
    );
    let images = generator.forward(noise).detach();
    let images = images.swap_dims(1, 2).swap_dims(2, 3);

    let path = format!("{outdir}/generated.png");
    save_image(normalize_for_save(images), 8, &path)?;
    info!("wrote {path}");

    Ok(())
}
