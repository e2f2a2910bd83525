use crate::architecture::ModelArchitecture;
use image::{imageops::FilterType, ImageError};
use ndarray::{Array, Ix4};

/// Decodes `image_data` as a color image and turns it into the normalized
/// `[1, 3, H, W]` tensor the selected architecture was trained on.
pub fn transform_image(
    image_data: &[u8],
    architecture: ModelArchitecture,
) -> Result<Array<f32, Ix4>, ImageError> {
    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(ImageError::IoError)?;

    let original_img = image_reader.decode()?;

    let (width, height) = architecture.input_size();
    let img = image::imageops::resize(
        &original_img.to_rgb8(),
        width,
        height,
        FilterType::Triangle,
    );

    let mean = architecture.mean();
    let std = architecture.std();
    let mut input = Array::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for (channel, value) in pixel.0.iter().enumerate() {
            input[[0, channel, y, x]] = ((*value as f32) / 255. - mean[channel]) / std[channel];
        }
    }

    Ok(input)
}
