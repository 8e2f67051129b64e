//! QR payload extraction from screenshot images.

use std::path::Path;

use tracing::debug;

use crate::error::{Result, SiglinkError};

/// Decodes the QR payload embedded in the image at `path`.
///
/// Deterministic for a given image: grids that fail to decode are skipped,
/// zero decoded payloads is [`SiglinkError::NoCodeFound`], and several grids
/// are accepted only when every payload agrees (a screenshot can contain the
/// same code twice, e.g. a preview thumbnail).
pub fn decode(path: &Path) -> Result<String> {
	let img = image::open(path).map_err(|e| SiglinkError::ImageLoad {
		path: path.to_path_buf(),
		reason: e.to_string(),
	})?;

	let gray = img.to_luma8();
	let (width, height) = (gray.width() as usize, gray.height() as usize);
	let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| gray.get_pixel(x as u32, y as u32).0[0]);
	let grids = prepared.detect_grids();
	debug!(target = "siglink.qr", path = %path.display(), grids = grids.len(), "detected QR grids");

	let mut payloads = Vec::new();
	for grid in grids {
		match grid.decode() {
			Ok((_, content)) => payloads.push(content),
			Err(e) => debug!(target = "siglink.qr", error = %e, "skipping undecodable grid"),
		}
	}

	let Some(first) = payloads.first() else {
		return Err(SiglinkError::NoCodeFound { path: path.to_path_buf() });
	};

	if payloads.iter().any(|payload| payload != first) {
		return Err(SiglinkError::MultipleCodesAmbiguous {
			path: path.to_path_buf(),
			count: payloads.len(),
		});
	}

	Ok(first.clone())
}

#[cfg(test)]
mod tests {
	use image::{GrayImage, Luma};
	use qrcode::QrCode;
	use tempfile::TempDir;

	use super::*;

	const URI: &str = "sgnl://linkdevice?uuid=ABCD&pub_key=XYZ";

	fn qr_image(payload: &str) -> GrayImage {
		QrCode::new(payload.as_bytes())
			.unwrap()
			.render::<Luma<u8>>()
			.min_dimensions(240, 240)
			.build()
	}

	fn paste(canvas: &mut GrayImage, tile: &GrayImage, x0: u32, y0: u32) {
		for (x, y, pixel) in tile.enumerate_pixels() {
			canvas.put_pixel(x0 + x, y0 + y, *pixel);
		}
	}

	fn save(dir: &TempDir, name: &str, img: &GrayImage) -> std::path::PathBuf {
		let path = dir.path().join(name);
		img.save(&path).unwrap();
		path
	}

	#[test]
	fn single_code_round_trips() {
		let tmp = TempDir::new().unwrap();
		let path = save(&tmp, "single.png", &qr_image(URI));
		assert_eq!(decode(&path).unwrap(), URI);
	}

	#[test]
	fn blank_image_has_no_code() {
		let tmp = TempDir::new().unwrap();
		let blank = GrayImage::from_pixel(320, 320, Luma([255]));
		let path = save(&tmp, "blank.png", &blank);
		assert!(matches!(decode(&path).unwrap_err(), SiglinkError::NoCodeFound { .. }));
	}

	#[test]
	fn disagreeing_codes_are_ambiguous() {
		let tmp = TempDir::new().unwrap();
		let a = qr_image(URI);
		let b = qr_image("sgnl://linkdevice?uuid=EFGH&pub_key=OTHER");
		let mut canvas = GrayImage::from_pixel(a.width() + b.width() + 120, a.height().max(b.height()) + 80, Luma([255]));
		paste(&mut canvas, &a, 40, 40);
		paste(&mut canvas, &b, a.width() + 80, 40);
		let path = save(&tmp, "two.png", &canvas);
		assert!(matches!(
			decode(&path).unwrap_err(),
			SiglinkError::MultipleCodesAmbiguous { count: 2, .. }
		));
	}

	#[test]
	fn agreeing_codes_return_the_common_payload() {
		let tmp = TempDir::new().unwrap();
		let a = qr_image(URI);
		let mut canvas = GrayImage::from_pixel(a.width() * 2 + 120, a.height() + 80, Luma([255]));
		paste(&mut canvas, &a, 40, 40);
		paste(&mut canvas, &a, a.width() + 80, 40);
		let path = save(&tmp, "twin.png", &canvas);
		assert_eq!(decode(&path).unwrap(), URI);
	}

	#[test]
	fn unreadable_file_is_an_image_load_error() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("not-an-image.png");
		std::fs::write(&path, b"plain text").unwrap();
		assert!(matches!(decode(&path).unwrap_err(), SiglinkError::ImageLoad { .. }));
	}
}
