use palette::Srgb;
use tracing::debug;

use crate::error::IntakeError;
use crate::extract::PixelBuffer;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Gate applied to an upload before any decoding happens.
#[derive(Clone, Debug)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    /// Lowercase, without the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl UploadPolicy {
    /// `true` if `filename` carries an allowed extension (case-insensitive).
    pub fn allows_file(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|a| *a == ext)
            }
            None => false,
        }
    }

    pub fn check(&self, filename: &str, bytes: &[u8]) -> Result<(), IntakeError> {
        if bytes.is_empty() {
            return Err(IntakeError::NoFile);
        }
        if !self.allows_file(filename) {
            return Err(IntakeError::InvalidFileType(filename.to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(IntakeError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

/// Decode an encoded image and flatten it to row-major RGB pixels.
/// Alpha, if any, is discarded.
pub fn decode_pixels(bytes: &[u8]) -> Result<PixelBuffer, IntakeError> {
    let img = image::load_from_memory(bytes)?;
    let rgb8 = img.to_rgb8();
    debug!(width = rgb8.width(), height = rgb8.height(), "decoded upload");

    let pixels = rgb8
        .into_raw()
        .chunks_exact(3)
        .map(|c| Srgb::new(c[0], c[1], c[2]))
        .collect();
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_allow_list() {
        let policy = UploadPolicy::default();
        assert!(policy.allows_file("photo.JPG"));
        assert!(policy.allows_file("archive.tar.webp"));
        assert!(!policy.allows_file("photo.gif"));
        assert!(!policy.allows_file("png"));
        assert!(!policy.allows_file("photo."));
    }

    #[test]
    fn check_order_and_limits() {
        let policy = UploadPolicy {
            max_bytes: 4,
            ..Default::default()
        };
        assert!(matches!(policy.check("a.png", &[]), Err(IntakeError::NoFile)));
        assert!(matches!(policy.check("a.exe", &[1]), Err(IntakeError::InvalidFileType(_))));
        assert!(matches!(
            policy.check("a.png", &[0; 5]),
            Err(IntakeError::TooLarge { size: 5, limit: 4 })
        ));
        assert!(policy.check("a.png", &[0; 4]).is_ok());
    }

    #[test]
    fn garbage_is_not_an_image() {
        let err = decode_pixels(b"definitely not a png").unwrap_err();
        assert!(matches!(err, IntakeError::NotAnImage(_)));
    }
}
