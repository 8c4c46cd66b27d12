use burn::{
    module::Module,
    nn::conv::{ConvTranspose2d, ConvTranspose2dConfig},
    prelude::*,
};

use crate::model::layers::{conv_initializer, DeconvBlock};

/// Maps `[batch, latent, 1, 1]` noise to `[batch, channels, 64, 64]` images
/// in `[-1, 1]`.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    in_layer: DeconvBlock<B>,
    up_layer_1: DeconvBlock<B>,
    up_layer_2: DeconvBlock<B>,
    up_layer_3: DeconvBlock<B>,
    out_layer: ConvTranspose2d<B>,
}

impl<B: Backend> Generator<B> {
    pub fn forward(&self, noise: Tensor<B, 4>) -> Tensor<B, 4> {
        let output = self.in_layer.forward(noise);
        let output = self.up_layer_1.forward(output);
        let output = self.up_layer_2.forward(output);
        let output = self.up_layer_3.forward(output);
        let output = self.out_layer.forward(output);

        burn::tensor::activation::tanh(output)
    }
}

#[derive(Config, Debug)]
pub struct GeneratorConfig {
    #[config(default = 100)]
    pub latent_dim: usize,
    #[config(default = 64)]
    pub feature_maps: usize,
    #[config(default = 3)]
    pub channels: usize,
}

impl GeneratorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        let f = self.feature_maps;

        // 1x1 -> 4x4, then three doublings up to 32x32
        let in_layer = DeconvBlock::new([self.latent_dim, f * 8], 1, 0, device);
        let up_layer_1 = DeconvBlock::new([f * 8, f * 4], 2, 1, device);
        let up_layer_2 = DeconvBlock::new([f * 4, f * 2], 2, 1, device);
        let up_layer_3 = DeconvBlock::new([f * 2, f], 2, 1, device);

        // 32x32 -> 64x64, straight into tanh without normalisation
        let out_layer = ConvTranspose2dConfig::new([f, self.channels], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .with_bias(false)
            .with_initializer(conv_initializer())
            .init(device);

        Generator {
            in_layer,
            up_layer_1,
            up_layer_2,
            up_layer_3,
            out_layer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn generator_produces_full_resolution_images() {
        let device = Default::default();
        let generator = GeneratorConfig::new()
            .with_latent_dim(16)
            .with_feature_maps(4)
            .init::<TestBackend>(&device);

        let noise = Tensor::random([2, 16, 1, 1], Distribution::Normal(0.0, 1.0), &device);
        let images = generator.forward(noise);

        assert_eq!(images.dims(), [2, 3, 64, 64]);
        let values = images.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
    }
}
