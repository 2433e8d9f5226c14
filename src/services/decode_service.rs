use crate::error::AppError;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;

/// Decode raw file bytes into an upright image.
/// Respects EXIF orientation.
pub fn decode_image(file_name: &str, bytes: &[u8]) -> Result<DynamicImage, AppError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::decode(file_name, e))?
        .decode()
        .map_err(|e| AppError::decode(file_name, e))?;

    let orientation = read_orientation(bytes);
    Ok(apply_orientation(img, orientation))
}

/// Parse the EXIF orientation tag, defaulting to 1.
fn read_orientation(bytes: &[u8]) -> u32 {
    // First 128KB covers most EXIF headers
    let header = &bytes[..bytes.len().min(128 * 1024)];

    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(header)) {
        Ok(e) => e,
        Err(_) => return 1,
    };

    match exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
        Some(field) => match field.value {
            exif::Value::Short(ref v) => *v.first().unwrap_or(&1) as u32,
            exif::Value::Long(ref v) => *v.first().unwrap_or(&1),
            _ => 1,
        },
        None => 1,
    }
}

fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.fliph().rotate90(),
        6 => img.rotate90(),
        7 => img.fliph().rotate270(),
        8 => img.rotate270(),
        _ => img,
    }
}
