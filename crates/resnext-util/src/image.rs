//! Image loading and ImageNet preprocessing.

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use thiserror::Error;

/// Per-channel mean of the ImageNet training set.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel standard deviation of the ImageNet training set.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// File extensions accepted by [`is_supported_image_format`].
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Largest accepted center crop side.
pub const MAX_CROP_SIZE: u32 = 8192;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to open image at '{path}': {source}")]
    ImageLoadError {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid channel count: expected 3 for image, got {actual}")]
    InvalidImageChannels { actual: usize },

    #[error("invalid image size {size}: crop size must be between 1 and {max}", max = MAX_CROP_SIZE)]
    InvalidCropSize { size: u32 },

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

pub type ImageResult<T> = Result<T, ImageError>;

/// Open an image file.
///
/// # Errors
///
/// Returns [`ImageError::ImageLoadError`] if the file cannot be read or decoded.
pub fn open_image(path: impl AsRef<Path>) -> ImageResult<DynamicImage> {
    let path = path.as_ref();
    image::open(path).map_err(|source| ImageError::ImageLoadError {
        path: path.display().to_string(),
        source,
    })
}

/// Load an image file as a `[1, 3, H, W]` tensor with values in `[0, 1]`.
///
/// # Errors
///
/// Returns [`ImageError::ImageLoadError`] if the file cannot be read or decoded.
pub fn load_image<B: Backend>(
    path: impl AsRef<Path>,
    device: &B::Device,
) -> ImageResult<Tensor<B, 4>> {
    let img = open_image(path)?;
    Ok(dynamic_image_to_tensor(img, device))
}

/// Convert an image to a `[1, 3, H, W]` tensor with values in `[0, 1]`.
pub fn dynamic_image_to_tensor<B: Backend>(img: DynamicImage, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = img.dimensions();

    let buf = img.into_rgb32f().into_raw();
    let data = TensorData::new(buf, [height as usize, width as usize, 3]);
    let tensor = Tensor::<B, 3>::from_data(data.convert::<B::FloatElem>(), device);

    tensor.permute([2, 0, 1]).unsqueeze::<4>()
}

/// Normalize a `[N, 3, H, W]` tensor in `[0, 1]` with the ImageNet mean and std.
///
/// # Errors
///
/// Returns [`ImageError::InvalidImageChannels`] if the tensor does not have 3 channels.
pub fn apply_imagenet_normalization<B: Backend>(image: Tensor<B, 4>) -> ImageResult<Tensor<B, 4>> {
    let channels = image.dims()[1];
    if channels != 3 {
        return Err(ImageError::InvalidImageChannels { actual: channels });
    }

    let device = image.device();
    let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
    let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, &device).reshape([1, 3, 1, 1]);

    Ok((image - mean) / std)
}

/// Side the shorter image edge is resized to before a center crop of `crop_size`
/// (256 for the usual 224 crop). Saturates at `u32::MAX`.
pub const fn resize_size(crop_size: u32) -> u32 {
    let size = crop_size as u64 * 256 / 224;
    if size > u32::MAX as u64 {
        u32::MAX
    } else {
        size as u32
    }
}

/// Resize the shorter side to [`resize_size`] keeping the aspect ratio, then cut the
/// central `crop_size` x `crop_size` square.
///
/// # Errors
///
/// Returns an error if `crop_size` is zero or above [`MAX_CROP_SIZE`], or if the image has
/// no pixels.
pub fn resize_and_center_crop(img: &DynamicImage, crop_size: u32) -> ImageResult<DynamicImage> {
    if crop_size == 0 || crop_size > MAX_CROP_SIZE {
        return Err(ImageError::InvalidCropSize { size: crop_size });
    }
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::EmptyImage { width, height });
    }

    let short_target = resize_size(crop_size);
    let (new_width, new_height) = if width <= height {
        let scaled = u64::from(height) * u64::from(short_target) / u64::from(width);
        (short_target, u32::try_from(scaled).unwrap_or(u32::MAX))
    } else {
        let scaled = u64::from(width) * u64::from(short_target) / u64::from(height);
        (u32::try_from(scaled).unwrap_or(u32::MAX), short_target)
    };

    let resized = img.resize_exact(new_width, new_height, FilterType::Triangle);

    let left = (new_width - crop_size) / 2;
    let top = (new_height - crop_size) / 2;
    Ok(resized.crop_imm(left, top, crop_size, crop_size))
}

/// Full classification preprocessing: resize, center crop, scale to `[0, 1]` and
/// normalize. Returns a `[1, 3, crop_size, crop_size]` tensor.
///
/// # Errors
///
/// See [`resize_and_center_crop`].
pub fn preprocess<B: Backend>(
    img: &DynamicImage,
    crop_size: u32,
    device: &B::Device,
) -> ImageResult<Tensor<B, 4>> {
    // Resample in float so that no precision is lost to 8-bit rounding.
    let img = DynamicImage::ImageRgb32F(img.to_rgb32f());
    let cropped = resize_and_center_crop(&img, crop_size)?;
    apply_imagenet_normalization(dynamic_image_to_tensor(cropped, device))
}

/// Whether `ext` (with or without a leading dot) is a supported image extension.
pub fn is_extension_supported(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.');
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(ext))
}

/// Whether the file at `path` has a supported image extension.
pub fn is_supported_image_format(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(is_extension_supported)
}

#[cfg(test)]
mod tests {
    use burn::{backend::NdArray, tensor::Tolerance};
    use image::{Rgb, RgbImage};

    use super::*;

    type TestBackend = NdArray<f32>;

    fn uniform_image(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value; 3])))
    }

    #[test]
    fn image_tensor_is_channel_first_in_unit_range() {
        let device = Default::default();
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));

        let tensor = dynamic_image_to_tensor::<TestBackend>(DynamicImage::ImageRgb8(img), &device);

        assert_eq!(tensor.dims(), [1, 3, 1, 2]);
        tensor.into_data().assert_approx_eq::<f32>(
            &TensorData::from([[[[1.0f32, 0.0]], [[0.0, 1.0]], [[0.0, 0.0]]]]),
            Tolerance::default(),
        );
    }

    #[test]
    fn normalization_centers_imagenet_mean() {
        let device = Default::default();
        let mean = Tensor::<TestBackend, 1>::from_floats(IMAGENET_MEAN, &device)
            .reshape([1, 3, 1, 1]);

        let normalized = apply_imagenet_normalization(mean).unwrap();

        normalized.into_data().assert_approx_eq::<f32>(
            &TensorData::from([[[[0.0f32]], [[0.0]], [[0.0]]]]),
            Tolerance::default(),
        );
    }

    #[test]
    fn normalization_divides_by_std() {
        let device = Default::default();
        let ones = Tensor::<TestBackend, 4>::ones([1, 3, 1, 1], &device);

        let normalized = apply_imagenet_normalization(ones).unwrap();

        let expected: Vec<f32> = (0..3)
            .map(|c| (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c])
            .collect();
        normalized.into_data().assert_approx_eq::<f32>(
            &TensorData::new(expected, [1, 3, 1, 1]),
            Tolerance::default(),
        );
    }

    #[test]
    fn normalization_rejects_grayscale() {
        let device = Default::default();
        let gray = Tensor::<TestBackend, 4>::zeros([1, 1, 4, 4], &device);
        assert!(matches!(
            apply_imagenet_normalization(gray),
            Err(ImageError::InvalidImageChannels { actual: 1 })
        ));
    }

    #[test]
    fn resize_size_scales_crop() {
        assert_eq!(resize_size(224), 256);
        assert_eq!(resize_size(448), 512);
        assert_eq!(resize_size(u32::MAX), u32::MAX);
        assert_eq!(resize_size(4_000_000_000), u32::MAX);
    }

    #[test]
    fn landscape_image_is_resized_and_cropped() {
        let cropped = resize_and_center_crop(&uniform_image(640, 480, 10), 224).unwrap();
        assert_eq!(cropped.dimensions(), (224, 224));
    }

    #[test]
    fn small_portrait_image_is_upscaled_and_cropped() {
        let cropped = resize_and_center_crop(&uniform_image(20, 50, 10), 224).unwrap();
        assert_eq!(cropped.dimensions(), (224, 224));
    }

    #[test]
    fn center_crop_keeps_middle_of_image() {
        // Left and right thirds black, middle third white: the crop must be mostly white.
        let mut img = RgbImage::new(768, 256);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            if (256..512).contains(&x) {
                *pixel = Rgb([255; 3]);
            }
        }

        let cropped = resize_and_center_crop(&DynamicImage::ImageRgb8(img), 224).unwrap();
        let center = cropped.to_rgb8();
        assert_eq!(center.get_pixel(112, 112), &Rgb([255; 3]));
        assert_eq!(center.get_pixel(0, 0), &Rgb([255; 3]));
    }

    #[test]
    fn zero_crop_size_is_rejected() {
        assert!(matches!(
            resize_and_center_crop(&uniform_image(8, 8, 0), 0),
            Err(ImageError::InvalidCropSize { size: 0 })
        ));
    }

    #[test]
    fn oversized_crop_size_is_rejected() {
        let img = uniform_image(8, 8, 0);
        assert!(matches!(
            resize_and_center_crop(&img, MAX_CROP_SIZE + 1),
            Err(ImageError::InvalidCropSize { .. })
        ));
        assert!(matches!(
            resize_and_center_crop(&img, u32::MAX),
            Err(ImageError::InvalidCropSize { size: u32::MAX })
        ));
    }

    #[test]
    fn preprocess_produces_normalized_crop() {
        let device = Default::default();
        let tensor = preprocess::<TestBackend>(&uniform_image(300, 200, 255), 224, &device).unwrap();

        assert_eq!(tensor.dims(), [1, 3, 224, 224]);

        for channel in 0..3 {
            let plane = tensor.clone().slice([0..1, channel..channel + 1, 0..224, 0..224]);
            let expected = (1.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel];
            let min = plane.clone().min().into_scalar();
            let max = plane.max().into_scalar();
            assert!((min - expected).abs() < 1e-3);
            assert!((max - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn load_image_reads_png() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(4, 3, Rgb([255, 0, 0])).save(&path).unwrap();

        let tensor = load_image::<TestBackend>(&path, &device).unwrap();
        assert_eq!(tensor.dims(), [1, 3, 3, 4]);
    }

    #[test]
    fn load_image_reports_missing_file() {
        let device = Default::default();
        let result = load_image::<TestBackend>("/nonexistent/cat.png", &device);
        assert!(matches!(result, Err(ImageError::ImageLoadError { .. })));
    }

    #[test]
    fn is_supported_image_format_returns_correct_results() {
        assert!(is_supported_image_format("test.jpg"));
        assert!(is_supported_image_format("test.jpeg"));
        assert!(is_supported_image_format("test.png"));
        assert!(is_supported_image_format("test.bmp"));
        assert!(is_supported_image_format("test.webp"));

        assert!(is_supported_image_format("test.JPG"));
        assert!(is_supported_image_format("test.PNG"));

        assert!(!is_supported_image_format("test.txt"));
        assert!(!is_supported_image_format("labels.json"));
        assert!(!is_supported_image_format("test"));

        assert!(is_supported_image_format("/path/to/image.jpg"));
        assert!(is_supported_image_format("./relative/path/image.png"));
    }

    #[test]
    fn image_extension_support_works_correctly() {
        assert!(is_extension_supported("jpg"));
        assert!(is_extension_supported(".png"));
        assert!(is_extension_supported("WebP"));
        assert!(!is_extension_supported("gif"));
    }
}
