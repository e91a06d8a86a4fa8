//! Static colour-name table for participant tags.

use std::fmt;

/// Linear RGB display colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// Red channel, 0.0–1.0.
    pub r: f32,
    /// Green channel, 0.0–1.0.
    pub g: f32,
    /// Blue channel, 0.0–1.0.
    pub b: f32,
}

impl Color {
    /// Neutral colour used for absent or unknown tags.
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    /// Build a colour from channel values.
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Resolve a colour tag. Lookup is exact and case-sensitive.
    pub fn from_tag(tag: Option<&str>) -> Color {
        tag.and_then(|name| {
            COLOR_TABLE
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, color)| *color)
        })
        .unwrap_or(Color::WHITE)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        write!(
            f,
            "#{:02x}{:02x}{:02x}",
            channel(self.r),
            channel(self.g),
            channel(self.b)
        )
    }
}

const COLOR_TABLE: [(&str, Color); 12] = [
    ("red", Color::rgb(1.0, 0.0, 0.0)),
    ("orange", Color::rgb(1.0, 0.5, 0.0)),
    ("yellow", Color::rgb(1.0, 0.92, 0.016)),
    ("olive", Color::rgb(0.7, 0.8, 0.1)),
    ("green", Color::rgb(0.0, 1.0, 0.0)),
    ("teal", Color::rgb(0.0, 0.8, 0.8)),
    ("blue", Color::rgb(0.0, 0.0, 1.0)),
    ("violet", Color::rgb(0.4, 0.2, 0.8)),
    ("purple", Color::rgb(0.7, 0.2, 0.8)),
    ("pink", Color::rgb(0.9, 0.2, 0.6)),
    ("brown", Color::rgb(0.7, 0.4, 0.2)),
    ("grey", Color::rgb(0.5, 0.5, 0.5)),
];

/// Every tag the table knows, in table order.
pub fn color_names() -> impl Iterator<Item = &'static str> {
    COLOR_TABLE.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tag_resolves() {
        assert_eq!(Color::from_tag(Some("teal")), Color::rgb(0.0, 0.8, 0.8));
    }

    #[test]
    fn test_missing_or_unknown_tag_is_white() {
        assert_eq!(Color::from_tag(None), Color::WHITE);
        assert_eq!(Color::from_tag(Some("chartreuse")), Color::WHITE);
        assert_eq!(Color::from_tag(Some("RED")), Color::WHITE);
    }

    #[test]
    fn test_table_names() {
        let names: Vec<_> = color_names().collect();
        assert_eq!(names.len(), 12);
        assert_eq!(names.first(), Some(&"red"));
        assert_eq!(names.last(), Some(&"grey"));
    }

    #[test]
    fn test_hex_display() {
        assert_eq!(Color::WHITE.to_string(), "#ffffff");
        assert_eq!(Color::from_tag(Some("orange")).to_string(), "#ff8000");
    }
}
