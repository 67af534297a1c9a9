use std::fmt;

use serde::{Deserialize, Serialize};

/// Shape family requested by a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ShapeIntent {
    Box,
    Cylinder,
    Sphere,
    Cone,
    Torus,
    Tube,
    /// A name nobody recognised; built as a box.
    Custom,
}

/// Keyword lists in priority order. The first list with a hit wins.
const KEYWORDS: &[(ShapeIntent, &[&str])] = &[
    (
        ShapeIntent::Box,
        &[
            "box",
            "cube",
            "cuboid",
            "rectangular",
            "rectangle",
            "block",
            "长方体",
            "盒子",
            "立方体",
            "方块",
        ],
    ),
    (
        ShapeIntent::Cylinder,
        &["cylinder", "cylindrical", "rod", "圆柱"],
    ),
    (ShapeIntent::Sphere, &["sphere", "spherical", "ball", "球"]),
    (ShapeIntent::Cone, &["cone", "conical", "圆锥", "锥"]),
    (
        ShapeIntent::Torus,
        &["torus", "donut", "doughnut", "ring", "圆环", "甜甜圈"],
    ),
    (ShapeIntent::Tube, &["tube", "pipe", "sleeve", "圆筒", "管"]),
];

impl ShapeIntent {
    pub const ALL: [ShapeIntent; 6] = [
        ShapeIntent::Box,
        ShapeIntent::Cylinder,
        ShapeIntent::Sphere,
        ShapeIntent::Cone,
        ShapeIntent::Torus,
        ShapeIntent::Tube,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ShapeIntent::Box => "box",
            ShapeIntent::Cylinder => "cylinder",
            ShapeIntent::Sphere => "sphere",
            ShapeIntent::Cone => "cone",
            ShapeIntent::Torus => "torus",
            ShapeIntent::Tube => "tube",
            ShapeIntent::Custom => "custom",
        }
    }

    /// Maps a shape name, including common aliases, to an intent. Unknown names are
    /// `Custom`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "box" | "cube" | "cuboid" | "block" | "rectangular" | "prism" => ShapeIntent::Box,
            "cylinder" | "rod" | "cylindrical" => ShapeIntent::Cylinder,
            "sphere" | "ball" | "spherical" => ShapeIntent::Sphere,
            "cone" | "conical" => ShapeIntent::Cone,
            "torus" | "donut" | "doughnut" | "ring" => ShapeIntent::Torus,
            "tube" | "pipe" | "sleeve" | "hollow cylinder" | "hollow_cylinder" => {
                ShapeIntent::Tube
            }
            _ => ShapeIntent::Custom,
        }
    }

    /// The intent actually built. `Custom` falls back to a box.
    pub fn buildable(self) -> Self {
        match self {
            ShapeIntent::Custom => ShapeIntent::Box,
            other => other,
        }
    }
}

impl From<String> for ShapeIntent {
    fn from(name: String) -> Self {
        ShapeIntent::from_name(&name)
    }
}

impl fmt::Display for ShapeIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword classifier over lower-cased text. Never fails; defaults to `Box`.
pub fn classify_shape(text: &str) -> ShapeIntent {
    let text = text.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| text.contains(keyword)))
        .map_or(ShapeIntent::Box, |(intent, _)| *intent)
}

#[cfg(test)]
mod tests {
    use super::{ShapeIntent, classify_shape};

    #[test]
    fn unmatched_text_defaults_to_box() {
        assert_eq!(classify_shape("a thing"), ShapeIntent::Box);
        assert_eq!(classify_shape(""), ShapeIntent::Box);
    }

    #[test]
    fn keywords_map_to_their_family() {
        let cases = [
            ("A Cylinder, please", ShapeIntent::Cylinder),
            ("a bouncy ball", ShapeIntent::Sphere),
            ("traffic cone", ShapeIntent::Cone),
            ("a donut", ShapeIntent::Torus),
            ("copper pipe", ShapeIntent::Tube),
            ("一个圆柱", ShapeIntent::Cylinder),
            ("圆锥", ShapeIntent::Cone),
            ("甜甜圈", ShapeIntent::Torus),
            ("圆筒", ShapeIntent::Tube),
            ("立方体", ShapeIntent::Box),
        ];
        for (text, expected) in cases {
            assert_eq!(classify_shape(text), expected, "{text}");
        }
    }

    #[test]
    fn earlier_lists_take_priority() {
        // Both box and sphere keywords: box wins.
        assert_eq!(classify_shape("a box holding a ball"), ShapeIntent::Box);
        // "tube" loses to "cylinder".
        assert_eq!(classify_shape("hollow cylinder tube"), ShapeIntent::Cylinder);
    }

    #[test]
    fn names_resolve_with_aliases_and_fallback() {
        assert_eq!(ShapeIntent::from_name("Cube"), ShapeIntent::Box);
        assert_eq!(ShapeIntent::from_name(" pipe "), ShapeIntent::Tube);
        assert_eq!(ShapeIntent::from_name("donut"), ShapeIntent::Torus);
        assert_eq!(ShapeIntent::from_name("gear"), ShapeIntent::Custom);
        assert_eq!(ShapeIntent::Custom.buildable(), ShapeIntent::Box);
        assert_eq!(ShapeIntent::Cone.buildable(), ShapeIntent::Cone);
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ShapeIntent::Torus).expect("serialize");
        assert_eq!(json, "\"torus\"");
        let parsed: ShapeIntent = serde_json::from_str("\"ball\"").expect("deserialize");
        assert_eq!(parsed, ShapeIntent::Sphere);
    }
}
