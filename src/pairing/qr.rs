//! Pairing code rendering.
//!
//! Encodes the pairing URI as a PNG QR code embedded in a data URI. When
//! local encoding fails the code is delegated to a remote QR service.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::Luma;
use qrcode::{EcLevel, QrCode};
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Minimum edge of the rendered code, in pixels.
pub const DEFAULT_QR_SIZE: u32 = 300;

/// Remote service used when local encoding fails.
pub const DEFAULT_FALLBACK_SERVICE: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Prefix of inline PNG codes.
const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

// ============================================================================
// PairingCode
// ============================================================================

/// A displayable pairing code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingCode {
    /// Locally rendered PNG as a `data:` URI.
    Inline {
        /// `data:image/png;base64,...`
        data_uri: String,
    },
    /// Image served by the remote fallback service.
    Remote {
        /// Image URL.
        url: String,
    },
}

impl PairingCode {
    /// Returns the value to use as an image source.
    #[inline]
    #[must_use]
    pub fn src(&self) -> &str {
        match self {
            Self::Inline { data_uri } => data_uri,
            Self::Remote { url } => url,
        }
    }

    /// Returns `true` if the code was rendered locally.
    #[inline]
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline { .. })
    }
}

// ============================================================================
// QrRenderer
// ============================================================================

/// Renders pairing URIs as QR codes.
///
/// Rendering is deterministic: the same URI always yields the same bytes.
#[derive(Debug, Clone)]
pub struct QrRenderer {
    size: u32,
    fallback_service: Option<String>,
}

impl Default for QrRenderer {
    fn default() -> Self {
        Self {
            size: DEFAULT_QR_SIZE,
            fallback_service: Some(DEFAULT_FALLBACK_SERVICE.to_string()),
        }
    }
}

impl QrRenderer {
    /// Creates a renderer with the default size and fallback service.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum edge in pixels.
    #[must_use]
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Sets the remote fallback service base URL.
    #[must_use]
    pub fn with_fallback_service(mut self, base_url: impl Into<String>) -> Self {
        self.fallback_service = Some(base_url.into());
        self
    }

    /// Disables the remote fallback.
    #[must_use]
    pub fn without_fallback(mut self) -> Self {
        self.fallback_service = None;
        self
    }

    /// Encodes `uri` as PNG bytes, black on white, error correction H.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the URI does not fit a QR code or PNG
    /// encoding fails.
    pub fn render_png(&self, uri: &str) -> Result<Vec<u8>> {
        let code = QrCode::with_error_correction_level(uri.as_bytes(), EcLevel::H)
            .map_err(|e| Error::encoding(format!("QR generation failed: {e}")))?;

        let image = code
            .render::<Luma<u8>>()
            .quiet_zone(true)
            .dark_color(Luma([0]))
            .light_color(Luma([255]))
            .min_dimensions(self.size, self.size)
            .build();

        let mut bytes = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut bytes);
        image::ImageEncoder::write_image(
            encoder,
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::L8,
        )
        .map_err(|e| Error::encoding(format!("PNG encoding failed: {e}")))?;

        Ok(bytes)
    }

    /// Renders `uri` as a displayable code.
    ///
    /// Falls back to the remote service if local rendering fails.
    ///
    /// # Errors
    ///
    /// Returns the local encoding error if no fallback is configured, or
    /// [`Error::Url`] if the fallback base URL is invalid.
    pub fn render(&self, uri: &str) -> Result<PairingCode> {
        match self.render_png(uri) {
            Ok(png) => Ok(PairingCode::Inline {
                data_uri: format!("{PNG_DATA_URI_PREFIX}{}", STANDARD.encode(png)),
            }),
            Err(e) => {
                let Some(service) = &self.fallback_service else {
                    return Err(e);
                };
                warn!(error = %e, "Local QR rendering failed, using remote service");
                Ok(PairingCode::Remote {
                    url: self.fallback_url(service, uri)?,
                })
            }
        }
    }

    fn fallback_url(&self, service: &str, uri: &str) -> Result<String> {
        let size = format!("{0}x{0}", self.size);
        let url = Url::parse_with_params(service, &[("size", size.as_str()), ("data", uri)])?;
        Ok(url.into())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "wc:7f6e504bfad60b485450578e05678ed3e8e8c4751d3c6160be17160d63ec90f9@2\
        ?relay-protocol=irn&symKey=587d5484ce2a2a6ee3ba1962fdd7e8588e06200c46823bd18fbd67def96ad303";

    #[test]
    fn test_png_magic_and_size() {
        let png = QrRenderer::new().render_png(URI).unwrap();
        assert!(png.starts_with(&[0x89, 0x50, 0x4E, 0x47]));

        let decoded = image::load_from_memory(&png).unwrap();
        assert!(decoded.width() >= DEFAULT_QR_SIZE);
        assert_eq!(decoded.width(), decoded.height());
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let renderer = QrRenderer::new();
        assert_eq!(renderer.render(URI).unwrap(), renderer.render(URI).unwrap());
    }

    #[test]
    fn test_inline_data_uri() {
        let code = QrRenderer::new().render(URI).unwrap();
        assert!(code.is_inline());
        assert!(code.src().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_oversized_uri_uses_remote_service() {
        let uri = format!("wc:{}", "a".repeat(4000));
        let code = QrRenderer::new().render(&uri).unwrap();

        let PairingCode::Remote { url } = code else {
            panic!("expected remote fallback");
        };
        assert!(url.starts_with("https://api.qrserver.com/v1/create-qr-code/?size=300x300&data=wc%3A"));
    }

    #[test]
    fn test_oversized_uri_without_fallback() {
        let uri = format!("wc:{}", "a".repeat(4000));
        let err = QrRenderer::new().without_fallback().render(&uri).unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));
    }

    #[test]
    fn test_invalid_fallback_service() {
        let uri = format!("wc:{}", "a".repeat(4000));
        let err = QrRenderer::new()
            .with_fallback_service("not a url")
            .render(&uri)
            .unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }
}
