use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        BatchNorm, BatchNormConfig, Initializer, LeakyRelu, LeakyReluConfig, PaddingConfig2d,
        Relu,
    },
    prelude::*,
};

/// Weight distribution the DCGAN recipe prescribes for every convolution.
pub fn conv_initializer() -> Initializer {
    Initializer::Normal {
        mean: 0.0,
        std: 0.02,
    }
}

/// Fractionally strided convolution block of the generator.
#[derive(Module, Debug)]
pub struct DeconvBlock<B: Backend> {
    deconv: ConvTranspose2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> DeconvBlock<B> {
    pub fn new(channels: [usize; 2], stride: usize, padding: usize, device: &B::Device) -> Self {
        let deconv = ConvTranspose2dConfig::new(channels, [4, 4])
            .with_stride([stride, stride])
            .with_padding([padding, padding])
            .with_bias(false)
            .with_initializer(conv_initializer())
            .init(device);
        let bn = BatchNormConfig::new(channels[1]).init(device);
        let relu = Relu::new();

        Self { deconv, bn, relu }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let output = self.deconv.forward(input);
        let output = self.bn.forward(output);
        self.relu.forward(output)
    }
}

/// Strided convolution block of the discriminator. Halves the spatial size.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    lrelu: LeakyRelu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(channels: [usize; 2], device: &B::Device) -> Self {
        let conv = Conv2dConfig::new(channels, [4, 4])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(conv_initializer())
            .init(device);
        let bn = BatchNormConfig::new(channels[1]).init(device);
        let lrelu = LeakyReluConfig::new().with_negative_slope(0.2).init();

        Self { conv, bn, lrelu }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let output = self.conv.forward(input);
        let output = self.bn.forward(output);
        self.lrelu.forward(output)
    }
}
