//! Label font.
//!
//! DejaVu Sans Mono Bold is compiled in, so labels look the same on every
//! machine and no font lookup can fail at runtime.

use ab_glyph::{FontRef, PxScale};
use std::sync::OnceLock;

static FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSansMono-Bold.ttf");

/// The bundled label font. `None` only if the embedded file is unreadable.
pub fn label_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(FONT_DATA) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!("Bundled label font is invalid: {}", e);
            None
        }
    })
    .as_ref()
}

/// Pixel size of `text` rendered at `font_size` px.
pub fn text_size(text: &str, font_size: f32) -> (u32, u32) {
    match label_font() {
        Some(font) => imageproc::drawing::text_size(PxScale::from(font_size), font, text),
        None => (0, 0),
    }
}
