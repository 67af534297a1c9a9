//! Turns short bilingual part descriptions into a shape intent and a fully populated
//! parameter set.

pub mod classify;
pub mod dimensions;
pub mod resolve;
pub mod semantic;

use serde::Serialize;

pub use classify::{ShapeIntent, classify_shape};
pub use dimensions::{ParsedDimensions, extract_dimensions};
pub use resolve::{ExplicitParams, ResolvedParameters, resolve_intent, resolve_parameters};
pub use semantic::{
    HttpSemanticParser, SemanticDimensions, SemanticOutcome, SemanticParse, SemanticParseError,
    SemanticParser, SemanticParserConfig, default_system_prompt, parse_or_fallback,
};

/// Everything derived from one description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interpretation {
    pub intent: ShapeIntent,
    pub classified: ShapeIntent,
    pub extracted: ParsedDimensions,
    pub params: ResolvedParameters,
}

/// Runs extraction and classification, then resolves against the explicit overrides
/// and, when it succeeded, the semantic record.
pub fn interpret(
    text: &str,
    explicit: &ExplicitParams,
    semantic: Option<&SemanticOutcome>,
) -> Interpretation {
    let extracted = extract_dimensions(text);
    let classified = classify_shape(text);
    let record = semantic.and_then(SemanticOutcome::successful);
    Interpretation {
        intent: resolve_intent(explicit.shape, record, classified),
        classified,
        extracted,
        params: resolve_parameters(explicit, record, &extracted),
    }
}

#[cfg(test)]
mod tests {
    use super::{ExplicitParams, SemanticOutcome, SemanticParse, ShapeIntent, interpret};

    #[test]
    fn labelled_box_keeps_default_depth() {
        let result = interpret(
            "a box 100mm wide, 60mm high, and 40mm deep",
            &ExplicitParams::default(),
            None,
        );
        assert_eq!(result.intent, ShapeIntent::Box);
        assert_eq!(result.params.width, 100.0);
        assert_eq!(result.params.height, 60.0);
        assert_eq!(result.params.depth, 20.0);
    }

    #[test]
    fn failed_semantic_parse_does_not_override_the_classifier() {
        let failed = SemanticOutcome {
            record: SemanticParse::fallback(),
            succeeded: false,
        };
        let result = interpret("a cylinder 30x60", &ExplicitParams::default(), Some(&failed));
        assert_eq!(result.intent, ShapeIntent::Cylinder);
        assert_eq!(result.params.diameter, 30.0);
        assert_eq!(result.params.height, 60.0);
    }

    #[test]
    fn unknown_semantic_shape_builds_as_box() {
        let outcome = SemanticOutcome {
            record: SemanticParse {
                shape: Some("gear".into()),
                ..SemanticParse::default()
            },
            succeeded: true,
        };
        let result = interpret("a sphere", &ExplicitParams::default(), Some(&outcome));
        assert_eq!(result.intent, ShapeIntent::Custom);
        assert_eq!(result.intent.buildable(), ShapeIntent::Box);
        assert_eq!(result.classified, ShapeIntent::Sphere);
    }

    #[test]
    fn explicit_shape_beats_everything() {
        let explicit = ExplicitParams {
            shape: Some(ShapeIntent::Torus),
            ..ExplicitParams::default()
        };
        assert_eq!(interpret("a box", &explicit, None).intent, ShapeIntent::Torus);
    }
}
