use wasm_bindgen::prelude::*;
use js_sys::{Array, Object, Reflect};
use tracing::error;

pub mod cluster;
pub mod config;
pub mod error;
pub mod extract;
pub mod intake;

pub use cluster::{ClusterSet, Clusterer, KmeansColors};
pub use config::ExtractConfig;
pub use error::{ColorError, ExtractError, IntakeError};
pub use extract::{DominantColor, PixelBuffer, extract, extract_with};
pub use intake::UploadPolicy;

/// Run the full upload → color path: upload guard, decode, extract.
///
/// Failures that map to a 5xx status are logged with their internal detail;
/// callers should show only [`ColorError::public_message`].
pub fn dominant_color_bytes(
    input: &[u8],
    filename: &str,
    policy: &UploadPolicy,
    config: &ExtractConfig,
) -> Result<DominantColor, ColorError> {
    let result = policy
        .check(filename, input)
        .and_then(|()| intake::decode_pixels(input))
        .map_err(ColorError::from)
        .and_then(|pixels| extract(pixels, config).map_err(ColorError::from));

    if let Err(e) = &result {
        if e.status_code() >= 500 {
            error!(filename, "dominant color extraction failed: {e}");
        }
    }
    result
}

// ------------------------------------------------------------
// WebAssembly entry point
// ------------------------------------------------------------

/// Find the dominant color of an uploaded image.
///
/// `k` overrides the cluster count and `seed` pins the random source; when
/// `seed` is omitted the result may differ slightly between calls.
///
/// Resolves to `{ hex: "#rrggbb", rgb: [r, g, b] }`. Errors are plain strings
/// suitable for display.
#[wasm_bindgen]
pub fn dominant_color(
    input: Vec<u8>,
    filename: String,
    k: Option<usize>,
    seed: Option<u64>,
) -> Result<Object, JsValue> {
    let mut config = ExtractConfig {
        random_seed: seed,
        ..ExtractConfig::default()
    };
    if let Some(k) = k {
        config.k = k;
    }

    let color = dominant_color_bytes(&input, &filename, &UploadPolicy::default(), &config)
        .map_err(|e| JsValue::from_str(&e.public_message()))?;

    let rgb_js = Array::new();
    for channel in color.rgb {
        rgb_js.push(&JsValue::from(channel));
    }

    let result = Object::new();
    Reflect::set(&result, &JsValue::from_str("hex"), &JsValue::from_str(&color.hex))?;
    Reflect::set(&result, &JsValue::from_str("rgb"), &rgb_js)?;

    Ok(result)
}
