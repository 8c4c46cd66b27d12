use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        LeakyRelu, LeakyReluConfig, PaddingConfig2d, Sigmoid,
    },
    prelude::*,
};

use crate::model::layers::{conv_initializer, ConvBlock};

/// Scores `[batch, channels, 64, 64]` images as real (1) or generated (0).
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    in_layer: Conv2d<B>,
    down_layer_1: ConvBlock<B>,
    down_layer_2: ConvBlock<B>,
    down_layer_3: ConvBlock<B>,
    out_layer: Conv2d<B>,
    lrelu: LeakyRelu,
    sig: Sigmoid,
}

impl<B: Backend> Discriminator<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let output = self.in_layer.forward(images);
        let output = self.lrelu.forward(output);

        let output = self.down_layer_1.forward(output);
        let output = self.down_layer_2.forward(output);
        let output = self.down_layer_3.forward(output);

        let output = self.out_layer.forward(output);
        let output = output.flatten(1, 3);

        // Keep the probabilities away from 0 and 1 so the BCE loss stays finite.
        self.sig.forward(output).clamp(0.00001, 0.99999)
    }
}

#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    #[config(default = 64)]
    pub feature_maps: usize,
    #[config(default = 3)]
    pub channels: usize,
}

impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        let f = self.feature_maps;

        // No batch norm in front of the first activation.
        let in_layer = Conv2dConfig::new([self.channels, f], [4, 4])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(conv_initializer())
            .init(device);

        let down_layer_1 = ConvBlock::new([f, f * 2], device);
        let down_layer_2 = ConvBlock::new([f * 2, f * 4], device);
        let down_layer_3 = ConvBlock::new([f * 4, f * 8], device);

        // collapses the remaining 4x4 map into a single score per image
        let out_layer = Conv2dConfig::new([f * 8, 1], [4, 4])
            .with_bias(false)
            .with_initializer(conv_initializer())
            .init(device);

        Discriminator {
            in_layer,
            down_layer_1,
            down_layer_2,
            down_layer_3,
            out_layer,
            lrelu: LeakyReluConfig::new().with_negative_slope(0.2).init(),
            sig: Sigmoid::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn discriminator_scores_each_image_once() {
        let device = Default::default();
        let discriminator = DiscriminatorConfig::new()
            .with_feature_maps(4)
            .init::<TestBackend>(&device);

        let images = Tensor::random([2, 3, 64, 64], Distribution::Normal(0.0, 1.0), &device);
        let scores = discriminator.forward(images);

        assert_eq!(scores.dims(), [2, 1]);
        let values = scores.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (0.0..1.0).contains(v)));
    }
}
