use serde::{Deserialize, Serialize};

use crate::classify::ShapeIntent;
use crate::dimensions::ParsedDimensions;
use crate::semantic::SemanticParse;

pub const DEFAULT_WIDTH: f64 = 50.0;
pub const DEFAULT_HEIGHT: f64 = 30.0;
pub const DEFAULT_DEPTH: f64 = 20.0;
pub const DEFAULT_DIAMETER: f64 = 25.0;
pub const DEFAULT_MAJOR_RADIUS: f64 = 30.0;
pub const DEFAULT_MINOR_RADIUS: f64 = 10.0;
pub const DEFAULT_WALL_THICKNESS: f64 = 3.0;

/// Caller-supplied overrides. `None` and `Some(0.0)` both mean "not given".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplicitParams {
    pub shape: Option<ShapeIntent>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub depth: Option<f64>,
    pub diameter: Option<f64>,
    pub radius1: Option<f64>,
    pub radius2: Option<f64>,
    pub major_radius: Option<f64>,
    pub minor_radius: Option<f64>,
    pub wall_thickness: Option<f64>,
}

/// Fully populated build parameters in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParameters {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    pub diameter: f64,
    pub radius1: f64,
    pub radius2: f64,
    pub major_radius: f64,
    pub minor_radius: f64,
    pub wall_thickness: f64,
}

fn given(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

fn pick(explicit: Option<f64>, semantic: Option<f64>, extracted: Option<f64>, default: f64) -> f64 {
    given(explicit)
        .or(semantic.filter(|v| v.is_finite() && *v > 0.0))
        .or(extracted)
        .unwrap_or(default)
}

fn diameter_of(diameter: Option<f64>, radius: Option<f64>) -> Option<f64> {
    diameter.or_else(|| radius.map(|r| r * 2.0))
}

/// Merges the three sources field by field: explicit, then semantic (only for a
/// successful record), then extracted, then the default.
pub fn resolve_parameters(
    explicit: &ExplicitParams,
    semantic: Option<&SemanticParse>,
    extracted: &ParsedDimensions,
) -> ResolvedParameters {
    let sem = semantic.map(|record| record.dimensions).unwrap_or_default();

    let width = pick(explicit.width, sem.width, extracted.width, DEFAULT_WIDTH);
    let height = pick(explicit.height, sem.height, extracted.height, DEFAULT_HEIGHT);
    let depth = pick(explicit.depth, sem.depth, extracted.depth, DEFAULT_DEPTH);
    let diameter = pick(
        explicit.diameter,
        diameter_of(sem.diameter, sem.radius),
        diameter_of(extracted.diameter, extracted.radius),
        DEFAULT_DIAMETER,
    );

    let semantic_wall = semantic
        .filter(|record| record.is_hollow())
        .and_then(|record| record.wall_thickness);
    let wall_thickness = pick(
        explicit.wall_thickness,
        semantic_wall,
        extracted.wall_thickness,
        DEFAULT_WALL_THICKNESS,
    );

    ResolvedParameters {
        width,
        height,
        depth,
        diameter,
        radius1: given(explicit.radius1).unwrap_or(diameter / 2.0),
        radius2: given(explicit.radius2).unwrap_or(diameter / 4.0),
        major_radius: given(explicit.major_radius).unwrap_or(DEFAULT_MAJOR_RADIUS),
        minor_radius: given(explicit.minor_radius).unwrap_or(DEFAULT_MINOR_RADIUS),
        wall_thickness,
    }
}

/// Explicit shape, then the semantic shape name, then the keyword classifier.
pub fn resolve_intent(
    explicit: Option<ShapeIntent>,
    semantic: Option<&SemanticParse>,
    classified: ShapeIntent,
) -> ShapeIntent {
    explicit
        .or_else(|| {
            semantic
                .and_then(|record| record.shape.as_deref())
                .map(ShapeIntent::from_name)
        })
        .unwrap_or(classified)
}
