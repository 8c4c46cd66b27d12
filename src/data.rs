use anyhow::{bail, Context, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};
use flate2::read::GzDecoder;
use image::{imageops::FilterType, RgbImage};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::utils::image_to_tensor;

const CIFAR10_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";
const BATCH_DIR: &str = "cifar-10-batches-bin";
const TRAIN_BATCHES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];

const SIDE: usize = 32;
const PLANE: usize = SIDE * SIDE;
// Each record is a label byte followed by the red, green and blue planes.
const RECORD_LEN: usize = 1 + 3 * PLANE;

// ////////////////////////////////////////////////////////////////////////////
// Dataset

/// One decoded CIFAR-10 record.
#[derive(Debug, Clone)]
pub struct Cifar10Item {
    /// Interleaved RGB bytes, 32x32.
    pub pixels: Vec<u8>,
    pub label: u8,
}

/// The CIFAR-10 training split, loaded from the binary distribution.
#[derive(Debug, Clone)]
pub struct Cifar10Dataset {
    items: Vec<Cifar10Item>,
}

impl Cifar10Dataset {
    /// Loads the training split from `root`, downloading and unpacking the
    /// archive first when the batch files are not there yet.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let batch_root = ensure_downloaded(root.as_ref())?;

        let mut items = Vec::new();
        for name in TRAIN_BATCHES {
            let path = batch_root.join(name);
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            parse_batch_file(&bytes, &mut items)
                .with_context(|| format!("malformed batch file {}", path.display()))?;
        }

        info!(images = items.len(), "loaded the CIFAR-10 training split");
        Ok(Self { items })
    }
}

impl Dataset<Cifar10Item> for Cifar10Dataset {
    fn get(&self, index: usize) -> Option<Cifar10Item> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

fn parse_batch_file(bytes: &[u8], items: &mut Vec<Cifar10Item>) -> Result<()> {
    if bytes.len() % RECORD_LEN != 0 {
        bail!(
            "length {} is not a multiple of the {RECORD_LEN}-byte record",
            bytes.len()
        );
    }
    for record in bytes.chunks_exact(RECORD_LEN) {
        items.push(parse_record(record));
    }

    Ok(())
}

fn parse_record(record: &[u8]) -> Cifar10Item {
    let label = record[0];
    let planes = &record[1..];

    let mut pixels = Vec::with_capacity(3 * PLANE);
    for i in 0..PLANE {
        pixels.push(planes[i]);
        pixels.push(planes[PLANE + i]);
        pixels.push(planes[2 * PLANE + i]);
    }

    Cifar10Item { pixels, label }
}

fn ensure_downloaded(root: &Path) -> Result<PathBuf> {
    let batch_root = root.join(BATCH_DIR);
    if TRAIN_BATCHES
        .iter()
        .all(|name| batch_root.join(name).exists())
    {
        return Ok(batch_root);
    }

    std::fs::create_dir_all(root)
        .with_context(|| format!("failed to create {}", root.display()))?;

    info!(url = CIFAR10_URL, "downloading CIFAR-10");
    let bytes = reqwest::blocking::get(CIFAR10_URL)
        .context("failed to request the CIFAR-10 archive")?
        .error_for_status()
        .context("the CIFAR-10 download was rejected")?
        .bytes()
        .context("failed to read the CIFAR-10 archive body")?;

    tar::Archive::new(GzDecoder::new(bytes.as_ref()))
        .unpack(root)
        .context("failed to unpack the CIFAR-10 archive")?;

    for name in TRAIN_BATCHES {
        if !batch_root.join(name).exists() {
            bail!("the archive did not contain {name}");
        }
    }

    Ok(batch_root)
}

// ////////////////////////////////////////////////////////////////////////////
// Batcher

#[derive(Debug, Clone)]
pub struct GanBatch<B: Backend> {
    /// `[batch, 3, size, size]` images in `[-1, 1]`.
    pub images: Tensor<B, 4>,
    pub size: usize,
}

/// Resizes items to the training resolution and stacks them into a batch.
/// The class labels are dropped; the adversarial loop never uses them.
#[derive(Debug, Clone)]
pub struct GanBatcher {
    image_size: usize,
}

impl GanBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }

    fn decode(&self, item: &Cifar10Item) -> RgbImage {
        let image = RgbImage::from_raw(SIDE as u32, SIDE as u32, item.pixels.clone())
            .expect("items hold exactly 32x32 interleaved RGB bytes");

        image::imageops::resize(
            &image,
            self.image_size as u32,
            self.image_size as u32,
            FilterType::Triangle,
        )
    }
}

impl<B: Backend> Batcher<B, Cifar10Item, GanBatch<B>> for GanBatcher {
    fn batch(&self, items: Vec<Cifar10Item>, device: &B::Device) -> GanBatch<B> {
        let images = items
            .iter()
            .map(|item| image_to_tensor::<B>(self.decode(item), device).unsqueeze_dim(0))
            .collect::<Vec<_>>();

        GanBatch {
            size: items.len(),
            images: Tensor::cat(images, 0).to_device(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    fn record_with(label: u8, r: u8, g: u8, b: u8) -> Vec<u8> {
        let mut record = vec![label];
        record.extend(std::iter::repeat_n(r, PLANE));
        record.extend(std::iter::repeat_n(g, PLANE));
        record.extend(std::iter::repeat_n(b, PLANE));
        record
    }

    #[test]
    fn record_planes_are_interleaved() {
        let item = parse_record(&record_with(7, 10, 20, 30));

        assert_eq!(item.label, 7);
        assert_eq!(item.pixels.len(), 3 * PLANE);
        assert_eq!(&item.pixels[..6], &[10, 20, 30, 10, 20, 30]);
    }

    #[test]
    fn truncated_batch_file_is_rejected() {
        let mut items = Vec::new();
        assert!(parse_batch_file(&vec![0u8; RECORD_LEN - 1], &mut items).is_err());
        assert!(items.is_empty());
    }

    #[test]
    fn whole_batch_file_is_parsed() {
        let mut bytes = record_with(0, 1, 2, 3);
        bytes.extend(record_with(9, 4, 5, 6));

        let mut items = Vec::new();
        parse_batch_file(&bytes, &mut items).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[1].label, 9);
    }

    #[test]
    fn batcher_stacks_and_rescales() {
        let device = Default::default();
        let items = vec![
            parse_record(&record_with(0, 0, 0, 0)),
            parse_record(&record_with(1, 255, 255, 255)),
        ];

        let batch: GanBatch<TestBackend> = GanBatcher::new(64).batch(items, &device);

        assert_eq!(batch.size, 2);
        assert_eq!(batch.images.dims(), [2, 3, 64, 64]);

        let min = batch.images.clone().min().into_scalar();
        let max = batch.images.max().into_scalar();
        assert!((min + 1.0).abs() < 1e-5);
        assert!((max - 1.0).abs() < 1e-5);
    }
}
