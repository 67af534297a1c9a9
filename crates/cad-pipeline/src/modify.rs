use sdf_core::Point3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::document::{Document, ObjectData};
use crate::engine::GeometryEngine;
use crate::error::{CadError, CadResult};

/// Uniform factor or one factor per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleSpec {
    Uniform(f64),
    PerAxis(Point3),
}

impl ScaleSpec {
    pub fn factors(self) -> Point3 {
        match self {
            ScaleSpec::Uniform(factor) => [factor; 3],
            ScaleSpec::PerAxis(factors) => factors,
        }
    }
}

fn default_axis() -> Point3 {
    [0.0, 0.0, 1.0]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    /// Degrees, right-handed about `axis` through the origin.
    pub angle: f64,
    #[serde(default = "default_axis")]
    pub axis: Point3,
}

/// Optional scale, rotate and translate steps. They always apply in that order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModRequest {
    pub scale: Option<ScaleSpec>,
    pub rotate: Option<Rotation>,
    pub translate: Option<Point3>,
}

impl ModRequest {
    pub fn is_empty(&self) -> bool {
        self.scale.is_none() && self.rotate.is_none() && self.translate.is_none()
    }

    pub fn validate(&self) -> CadResult<()> {
        if let Some(scale) = self.scale {
            let factors = scale.factors();
            if factors.iter().any(|f| !f.is_finite() || *f == 0.0) {
                return Err(CadError::InvalidParameters(format!(
                    "scale factors must be finite and non-zero, got {factors:?}"
                )));
            }
        }
        if let Some(rotation) = self.rotate {
            let [x, y, z] = rotation.axis;
            let length = (x * x + y * y + z * z).sqrt();
            if !rotation.angle.is_finite() || !length.is_finite() || length == 0.0 {
                return Err(CadError::InvalidParameters(format!(
                    "rotation needs a finite angle and a non-zero axis, got {} about {:?}",
                    rotation.angle, rotation.axis
                )));
            }
        }
        if let Some(offset) = self.translate
            && offset.iter().any(|v| !v.is_finite())
        {
            return Err(CadError::InvalidParameters(format!(
                "translation must be finite, got {offset:?}"
            )));
        }
        Ok(())
    }
}

/// Applies `request` to every solid in the document; meshes are left alone.
///
/// Nothing in the document changes unless every object transforms successfully.
/// Returns the number of modified objects.
pub fn apply_modifications<E: GeometryEngine>(
    engine: &E,
    document: Option<&mut Document<E::Solid>>,
    request: &ModRequest,
) -> CadResult<usize> {
    let document = document.ok_or(CadError::NoDocument)?;
    request.validate()?;

    let mut updated = Vec::new();
    for (index, object) in document.objects.iter().enumerate() {
        let Some(solid) = object.solid() else {
            continue;
        };
        let mut solid = solid.clone();
        if let Some(scale) = request.scale {
            solid = engine.scale(&solid, scale.factors())?;
        }
        if let Some(rotation) = request.rotate {
            solid = engine.rotate(&solid, rotation.axis, rotation.angle)?;
        }
        if let Some(offset) = request.translate {
            solid = engine.translate(&solid, offset)?;
        }
        updated.push((index, solid));
    }

    let count = updated.len();
    for (index, solid) in updated {
        let object = &mut document.objects[index];
        object.data = ObjectData::Solid(solid);
        object.touched = true;
    }
    engine.recompute(document)?;
    info!(objects = count, "applied modifications");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use sdf_core::{Sdf3, Solid};
    use sdf_mesh::Mesh;

    use super::{ModRequest, Rotation, ScaleSpec, apply_modifications};
    use crate::document::Document;
    use crate::engine::{GeometryEngine, SdfEngine};
    use crate::error::CadError;

    fn unit_box_document(engine: &SdfEngine) -> Document<Solid> {
        let mut doc = Document::new("Generated");
        doc.add_solid("Shape", engine.make_box(1.0, 1.0, 1.0).expect("box"));
        doc
    }

    #[test]
    fn no_document_is_an_error() {
        let engine = SdfEngine::default();
        let err = apply_modifications(&engine, None, &ModRequest::default()).expect_err("none");
        assert!(matches!(err, CadError::NoDocument));
    }

    #[test]
    fn scale_applies_before_translate_regardless_of_input_order() {
        let engine = SdfEngine::default();
        let request: ModRequest =
            serde_json::from_str(r#"{"translate": [10, 0, 0], "scale": 2}"#).expect("request");
        let mut doc = unit_box_document(&engine);
        apply_modifications(&engine, Some(&mut doc), &request).expect("modify");

        let solid = doc.first_solid().expect("solid");
        // Scaled first: the box spans x in [10, 12]. Translating first would give [20, 22].
        assert!(solid.evaluate([11.0, 1.0, 1.0]) < 0.0);
        assert!(solid.evaluate([21.0, 1.0, 1.0]) > 0.0);
        assert!(!doc.is_touched());
    }

    #[test]
    fn rotation_defaults_to_the_z_axis() {
        let engine = SdfEngine::default();
        let request: ModRequest =
            serde_json::from_str(r#"{"rotate": {"angle": 90}}"#).expect("request");
        assert_eq!(request.rotate.map(|r| r.axis), Some([0.0, 0.0, 1.0]));

        let mut doc = unit_box_document(&engine);
        apply_modifications(&engine, Some(&mut doc), &request).expect("modify");
        let solid = doc.first_solid().expect("solid");
        // +90 degrees about z maps the unit box onto x in [-1, 0].
        assert!(solid.evaluate([-0.5, 0.5, 0.5]) < 0.0);
        assert!(solid.evaluate([0.5, 0.5, 0.5]) > 0.0);
    }

    #[test]
    fn meshes_are_skipped() {
        let engine = SdfEngine::default();
        let mut doc = unit_box_document(&engine);
        doc.add_mesh("Scan", Mesh::empty());
        let request = ModRequest {
            translate: Some([1.0, 2.0, 3.0]),
            ..ModRequest::default()
        };
        let count = apply_modifications(&engine, Some(&mut doc), &request).expect("modify");
        assert_eq!(count, 1);
        assert_eq!(doc.objects[1].mesh(), Some(&Mesh::empty()));
    }

    #[test]
    fn invalid_requests_change_nothing() {
        let engine = SdfEngine::default();
        let mut doc = unit_box_document(&engine);
        let before = doc.clone();

        let zero_scale = ModRequest {
            scale: Some(ScaleSpec::PerAxis([1.0, 0.0, 1.0])),
            translate: Some([5.0, 0.0, 0.0]),
            ..ModRequest::default()
        };
        let zero_axis = ModRequest {
            rotate: Some(Rotation {
                angle: 45.0,
                axis: [0.0, 0.0, 0.0],
            }),
            ..ModRequest::default()
        };
        for request in [zero_scale, zero_axis] {
            let err = apply_modifications(&engine, Some(&mut doc), &request).expect_err("invalid");
            assert!(matches!(err, CadError::InvalidParameters(_)));
            assert_eq!(doc, before);
        }
    }

    #[test]
    fn uniform_scale_broadcasts() {
        assert_eq!(ScaleSpec::Uniform(1.5).factors(), [1.5, 1.5, 1.5]);
        let parsed: ScaleSpec = serde_json::from_str("[1, 2, 3]").expect("per axis");
        assert_eq!(parsed, ScaleSpec::PerAxis([1.0, 2.0, 3.0]));
        assert!(ModRequest::default().is_empty());
    }
}
