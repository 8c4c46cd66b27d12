use burn::prelude::*;
use image::{buffer::ConvertBuffer, ImageResult, Rgb32FImage, RgbImage};
use std::path::Path;

/// Converts an interleaved RGB image into a `[3, H, W]` tensor in `[-1, 1]`.
pub fn image_to_tensor<B: Backend>(image: RgbImage, device: &B::Device) -> Tensor<B, 3> {
    let (width, height) = image.dimensions();
    let pixels = image
        .into_raw()
        .into_iter()
        .map(|value| value as f32 / 255.0)
        .collect::<Vec<_>>();

    let tensor = Tensor::<B, 3>::from_data(
        TensorData::new(pixels, [height as usize, width as usize, 3]),
        device,
    );

    // [H, W, C] -> [C, H, W], rescaled from [0, 1] to [-1, 1]
    tensor.permute([2, 0, 1]) * 2.0 - 1.0
}

/// Min-max rescale into `[0, 1]` for the PNG writer, with the half-pixel
/// offset applied before the u8 conversion rounds down.
pub fn normalize_for_save<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let min = images.clone().min().reshape([1, 1, 1, 1]);
    let max = images.clone().max().reshape([1, 1, 1, 1]);
    let scaled = (images - min.clone()) / (max - min);

    (scaled + 0.5 / 255.0).clamp(0.0, 1.0)
}

/// Writes a `[B, H, W, C]` tensor as a PNG grid `nrow` images wide.
/// Values are expected in `[0, 1]`.
pub fn save_image<B: Backend, Q: AsRef<Path>>(
    images: Tensor<B, 4>,
    nrow: u32,
    path: Q,
) -> ImageResult<()> {
    let [count, height, width, channels] = images.dims();
    let ncol = (count as f32 / nrow as f32).ceil() as u32;

    // A single-channel input gets its channel repeated into RGB.
    let repeat = match channels {
        1 => 3,
        3 => 1,
        _ => panic!("expected 1 or 3 channels, got {channels}"),
    };

    let mut grid = RgbImage::new(nrow * width as u32, ncol * height as u32);
    for index in 0..count {
        let x_offset = index as u32 % nrow * width as u32;
        let y_offset = index as u32 / nrow * height as u32;

        let pixels = images
            .clone()
            .slice(index..index + 1)
            .into_data()
            .iter::<f32>()
            .flat_map(|value| std::iter::repeat_n(value, repeat))
            .collect();

        let tile = Rgb32FImage::from_vec(width as u32, height as u32, pixels)
            .expect("tile buffer matches the tile dimensions");
        let tile: RgbImage = tile.convert();
        for (x, y, pixel) in tile.enumerate_pixels() {
            grid.put_pixel(x_offset + x, y_offset + y, *pixel);
        }
    }

    grid.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    #[test]
    fn image_to_tensor_is_channel_major_in_unit_range() {
        let device = Default::default();
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(0, 0, image::Rgb([255, 0, 0]));

        let tensor = image_to_tensor::<TestBackend>(image, &device);
        assert_eq!(tensor.dims(), [3, 2, 2]);

        let values = tensor.into_data().to_vec::<f32>().unwrap();
        // red plane, pixel (0, 0)
        assert!((values[0] - 1.0).abs() < 1e-6);
        // green plane, pixel (0, 0)
        assert!((values[4] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_for_save_maps_into_unit_interval() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 4>::from_data([[[[-3.0, 1.0], [0.0, 5.0]]]], &device);

        let values = normalize_for_save(images)
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert!((values[0] - 0.5 / 255.0).abs() < 1e-6);
        assert!((values[3] - 1.0).abs() < 1e-6);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn save_image_lays_out_the_grid() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 4>::zeros([4, 8, 8, 3], &device);
        let path = std::env::temp_dir().join("dcgan-grid-test.png");

        save_image(images, 2, &path).unwrap();

        assert_eq!(image::image_dimensions(&path).unwrap(), (16, 16));
        std::fs::remove_file(&path).ok();
    }
}
