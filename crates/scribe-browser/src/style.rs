//! Computed style and box model reads.

use scribe_core::render::{BoxMetrics, Insets};

use crate::PlatformError;

pub fn computed_style(element: &web_sys::Element) -> Result<web_sys::CssStyleDeclaration, PlatformError> {
    web_sys::window()
        .ok_or("no window")?
        .get_computed_style(element)
        .map_err(|e| format!("get_computed_style failed: {:?}", e))?
        .ok_or_else(|| "no computed style".into())
}

/// Parse a CSS pixel length ("12.5px"). Anything else reads as zero.
pub fn px(value: &str) -> f64 {
    value
        .trim()
        .strip_suffix("px")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0.0)
}

fn insets(style: &web_sys::CssStyleDeclaration, prefix: &str, suffix: &str) -> Insets {
    let side = |name: &str| {
        let property = format!("{prefix}-{name}{suffix}");
        px(&style.get_property_value(&property).unwrap_or_default())
    };
    Insets {
        top: side("top"),
        right: side("right"),
        bottom: side("bottom"),
        left: side("left"),
    }
}

/// Box model and scroll state of `element`.
pub fn box_metrics(element: &web_sys::HtmlElement) -> BoxMetrics {
    let (padding, border) = match computed_style(element) {
        Ok(style) => (
            insets(&style, "padding", ""),
            insets(&style, "border", "-width"),
        ),
        Err(e) => {
            tracing::debug!(target: "scribe::browser", error = %e, "no computed style, assuming zero insets");
            (Insets::default(), Insets::default())
        }
    };
    BoxMetrics {
        width: element.offset_width() as f64,
        height: element.offset_height() as f64,
        padding,
        border,
        scroll_left: element.scroll_left() as f64,
        scroll_top: element.scroll_top() as f64,
        client_width: element.client_width() as f64,
        client_height: element.client_height() as f64,
    }
}

/// Line height in pixels; `normal` approximates to 1.2 times the font size.
pub fn line_height(style: &web_sys::CssStyleDeclaration) -> f64 {
    let raw = style.get_property_value("line-height").unwrap_or_default();
    let parsed = px(&raw);
    if parsed > 0.0 {
        return parsed;
    }
    let font_size = px(&style.get_property_value("font-size").unwrap_or_default());
    match raw.trim().parse::<f64>() {
        Ok(factor) => factor * font_size,
        Err(_) => font_size * 1.2,
    }
}

/// Position `overlay` over `surface`'s border box. The overlay must share the
/// surface's offset parent.
pub fn place_over(overlay: &web_sys::HtmlElement, surface: &web_sys::HtmlElement) -> Result<(), PlatformError> {
    let style = overlay.style();
    let set = |name: &str, value: &str| {
        style
            .set_property(name, value)
            .map_err(|e| format!("set_property {name} failed: {:?}", e))
    };
    set("position", "absolute")?;
    set("left", &format!("{}px", surface.offset_left()))?;
    set("top", &format!("{}px", surface.offset_top()))?;
    set("pointer-events", "none")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_px_parsing() {
        assert_eq!(px("12.5px"), 12.5);
        assert_eq!(px(" 3px "), 3.0);
        assert_eq!(px("normal"), 0.0);
        assert_eq!(px("1em"), 0.0);
    }
}
