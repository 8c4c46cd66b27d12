//! DCGAN trained on CIFAR-10.
//!
//! The generator maps latent noise to 64x64 RGB images and the discriminator
//! scores images as real or generated. [`training::train`] runs the
//! alternating adversarial loop over the CIFAR-10 training split and
//! periodically writes sample grids to the results directory.

pub mod data;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{Cifar10Dataset, Cifar10Item, GanBatch, GanBatcher};
pub use model::{
    discriminator::{Discriminator, DiscriminatorConfig},
    generator::{Generator, GeneratorConfig},
    ModelConfig,
};
pub use training::{train, TrainingConfig};

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray<f32>;
