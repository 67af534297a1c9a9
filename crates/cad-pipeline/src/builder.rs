use cad_intent::{ResolvedParameters, ShapeIntent};
use tracing::info;

use crate::document::Document;
use crate::engine::GeometryEngine;
use crate::error::{CadError, CadResult};

pub const GENERATED_DOCUMENT: &str = "Generated";
pub const GENERATED_OBJECT: &str = "Shape";

fn require_positive(name: &str, value: f64) -> CadResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CadError::InvalidParameters(format!(
            "{name} must be finite and greater than zero, got {value}"
        )))
    }
}

/// Checks every dimension the intent will use, before any engine call.
pub fn validate_parameters(intent: ShapeIntent, params: &ResolvedParameters) -> CadResult<()> {
    match intent.buildable() {
        ShapeIntent::Box | ShapeIntent::Custom => {
            require_positive("width", params.width)?;
            require_positive("depth", params.depth)?;
            require_positive("height", params.height)
        }
        ShapeIntent::Cylinder => {
            require_positive("diameter", params.diameter)?;
            require_positive("height", params.height)
        }
        ShapeIntent::Sphere => require_positive("diameter", params.diameter),
        ShapeIntent::Cone => {
            let (r1, r2) = (params.radius1, params.radius2);
            let valid = r1.is_finite() && r2.is_finite() && r1 >= 0.0 && r2 >= 0.0;
            if !valid || (r1 == 0.0 && r2 == 0.0) {
                return Err(CadError::InvalidParameters(format!(
                    "cone radii must be non-negative and not both zero, got {r1} and {r2}"
                )));
            }
            require_positive("height", params.height)
        }
        ShapeIntent::Torus => {
            require_positive("major_radius", params.major_radius)?;
            require_positive("minor_radius", params.minor_radius)
        }
        ShapeIntent::Tube => {
            require_positive("diameter", params.diameter)?;
            require_positive("height", params.height)?;
            require_positive("wall_thickness", params.wall_thickness)?;
            if params.wall_thickness >= params.diameter / 2.0 {
                return Err(CadError::InvalidParameters(format!(
                    "wall thickness {} leaves no bore in a tube of diameter {}",
                    params.wall_thickness, params.diameter
                )));
            }
            Ok(())
        }
    }
}

/// Builds the solid for `intent`. `Custom` is built as a box.
pub fn build_shape<E: GeometryEngine>(
    engine: &E,
    intent: ShapeIntent,
    params: &ResolvedParameters,
) -> CadResult<E::Solid> {
    validate_parameters(intent, params)?;
    let solid = match intent.buildable() {
        ShapeIntent::Box | ShapeIntent::Custom => {
            engine.make_box(params.width, params.depth, params.height)?
        }
        ShapeIntent::Cylinder => engine.make_cylinder(params.diameter / 2.0, params.height)?,
        ShapeIntent::Sphere => engine.make_sphere(params.diameter / 2.0)?,
        ShapeIntent::Cone => engine.make_cone(params.radius1, params.radius2, params.height)?,
        ShapeIntent::Torus => engine.make_torus(params.major_radius, params.minor_radius)?,
        ShapeIntent::Tube => {
            let outer_radius = params.diameter / 2.0;
            let outer = engine.make_cylinder(outer_radius, params.height)?;
            let inner =
                engine.make_cylinder(outer_radius - params.wall_thickness, params.height)?;
            engine.cut(&outer, &inner)?
        }
    };
    Ok(solid)
}

/// New `Generated` document holding the built shape, recomputed.
pub fn build_document<E: GeometryEngine>(
    engine: &E,
    intent: ShapeIntent,
    params: &ResolvedParameters,
) -> CadResult<Document<E::Solid>> {
    let solid = build_shape(engine, intent, params)?;
    let mut document = Document::new(GENERATED_DOCUMENT);
    document.add_solid(GENERATED_OBJECT, solid);
    engine.recompute(&mut document)?;
    info!(shape = %intent.buildable(), "generated document");
    Ok(document)
}
