pub mod discriminator;
pub mod generator;
mod layers;

use burn::prelude::*;

use crate::model::{
    discriminator::{Discriminator, DiscriminatorConfig},
    generator::{Generator, GeneratorConfig},
};

#[derive(Config, Debug)]
pub struct ModelConfig {
    pub generator: GeneratorConfig,
    pub discriminator: DiscriminatorConfig,
}

impl ModelConfig {
    /// Initialises the adversarial pair on `device`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> (Generator<B>, Discriminator<B>) {
        (self.generator.init(device), self.discriminator.init(device))
    }
}
