use std::path::Path;

use cad_intent::{
    ExplicitParams, HttpSemanticParser, Interpretation, SemanticOutcome, SemanticParse,
    SemanticParser, interpret, parse_or_fallback,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::builder::build_document;
use crate::config::PipelineConfig;
use crate::document::Document;
use crate::engine::{GeometryEngine, SdfEngine};
use crate::error::{CadError, CadResult};
use crate::export::{ExportFormat, ExportOutcome, export_document};
use crate::heightmap::{HeightmapOptions, heightmap_document};
use crate::load::load_document;
use crate::modify::{ModRequest, apply_modifications};

type BoxedParser = Box<dyn SemanticParser + Send>;

/// Result of reading a description, before or after building it.
#[derive(Debug, Clone)]
pub struct Generation {
    pub interpretation: Interpretation,
    /// Present only when the semantic parser was requested.
    pub semantic: Option<SemanticOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundsInfo {
    pub x: [f64; 2],
    pub y: [f64; 2],
    pub z: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectInfo {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundsInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentInfo {
    pub name: String,
    pub file_path: Option<String>,
    pub objects: Vec<ObjectInfo>,
}

pub struct SessionBuilder<E: GeometryEngine> {
    engine: Option<E>,
    parser: Option<BoxedParser>,
    config: PipelineConfig,
}

impl<E: GeometryEngine> SessionBuilder<E> {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            engine: None,
            parser: None,
            config,
        }
    }

    pub fn engine(mut self, engine: E) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn semantic_parser<P>(mut self, parser: P) -> Self
    where
        P: SemanticParser + Send + 'static,
    {
        self.parser = Some(Box::new(parser));
        self
    }

    pub fn build(self) -> Session<E> {
        Session {
            engine: self.engine,
            parser: self.parser,
            config: self.config,
            document: None,
        }
    }
}

/// Owns the capabilities and the single live document.
pub struct Session<E: GeometryEngine> {
    engine: Option<E>,
    parser: Option<BoxedParser>,
    config: PipelineConfig,
    document: Option<Document<E::Solid>>,
}

impl Session<SdfEngine> {
    /// SDF engine plus, when an endpoint is configured, the HTTP semantic parser.
    pub fn from_config(config: PipelineConfig) -> Self {
        let engine = SdfEngine::from_config(&config);
        let mut builder = SessionBuilder::new(config.clone()).engine(engine);
        if config.semantic.endpoint.is_some() {
            match HttpSemanticParser::from_config(&config.semantic) {
                Ok(parser) => builder = builder.semantic_parser(parser),
                Err(err) => warn!(error = %err, "semantic parser disabled"),
            }
        }
        builder.build()
    }
}

impl<E: GeometryEngine> Session<E> {
    pub fn builder(config: PipelineConfig) -> SessionBuilder<E> {
        SessionBuilder::new(config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&Document<E::Solid>> {
        self.document.as_ref()
    }

    pub fn has_semantic_parser(&self) -> bool {
        self.parser.is_some()
    }

    fn engine(&self) -> CadResult<&E> {
        self.engine
            .as_ref()
            .ok_or(CadError::MissingCapability("geometry engine"))
    }

    fn semantic_outcome(&mut self, text: &str) -> SemanticOutcome {
        match self.parser.as_mut() {
            Some(parser) => parse_or_fallback(parser, text),
            None => {
                warn!("semantic parsing requested but no parser is configured");
                SemanticOutcome {
                    record: SemanticParse::fallback(),
                    succeeded: false,
                }
            }
        }
    }

    /// Interprets `text` without building anything.
    pub fn parse(
        &mut self,
        text: &str,
        explicit: &ExplicitParams,
        use_semantic: bool,
    ) -> Generation {
        let semantic = use_semantic.then(|| self.semantic_outcome(text));
        let interpretation = interpret(text, explicit, semantic.as_ref());
        debug!(intent = %interpretation.intent, params = ?interpretation.params, "interpreted");
        Generation {
            interpretation,
            semantic,
        }
    }

    /// Interprets `text` and replaces the live document with the built shape.
    pub fn generate(
        &mut self,
        text: &str,
        explicit: &ExplicitParams,
        use_semantic: bool,
    ) -> CadResult<Generation> {
        self.engine()?;
        let generation = self.parse(text, explicit, use_semantic);
        let engine = self.engine()?;
        let document = build_document(
            engine,
            generation.interpretation.intent,
            &generation.interpretation.params,
        )?;
        self.document = Some(document);
        Ok(generation)
    }

    pub fn load(&mut self, path: &Path) -> CadResult<&Document<E::Solid>> {
        let document = load_document(self.engine()?, path)?;
        Ok(self.document.insert(document))
    }

    pub fn generate_from_image(
        &mut self,
        path: &Path,
        options: &HeightmapOptions,
    ) -> CadResult<&Document<E::Solid>> {
        let mut document = heightmap_document(path, options)?;
        self.engine()?.recompute(&mut document)?;
        Ok(self.document.insert(document))
    }

    pub fn modify(&mut self, request: &ModRequest) -> CadResult<usize> {
        let engine = self
            .engine
            .as_ref()
            .ok_or(CadError::MissingCapability("geometry engine"))?;
        apply_modifications(engine, self.document.as_mut(), request)
    }

    pub fn export(&mut self, path: &Path, format: Option<&str>) -> CadResult<ExportOutcome> {
        let engine = self.engine()?;
        let outcome = export_document(
            engine,
            self.document.as_ref(),
            path,
            format,
            self.config.tessellation_tolerance,
        )?;
        if outcome.format == ExportFormat::Native
            && let Some(document) = self.document.as_mut()
        {
            document.file_path = Some(outcome.path.clone());
        }
        Ok(outcome)
    }

    /// Summary of the live document; `None` when there is none.
    pub fn info(&self) -> CadResult<Option<DocumentInfo>> {
        let Some(document) = self.document.as_ref() else {
            return Ok(None);
        };
        let engine = self.engine()?;

        let mut objects = Vec::with_capacity(document.objects.len());
        for object in &document.objects {
            let properties = object
                .solid()
                .map(|solid| engine.properties(solid))
                .transpose()?;
            objects.push(ObjectInfo {
                name: object.name.clone(),
                label: object.label.clone(),
                type_id: object.object_type().to_string(),
                volume: properties.map(|p| p.volume),
                surface_area: properties.map(|p| p.area),
                bounds: properties.map(|p| BoundsInfo {
                    x: [p.bounds.min[0], p.bounds.max[0]],
                    y: [p.bounds.min[1], p.bounds.max[1]],
                    z: [p.bounds.min[2], p.bounds.max[2]],
                }),
            });
        }
        info!(document = %document.name, objects = objects.len(), "collected info");
        Ok(Some(DocumentInfo {
            name: document.name.clone(),
            file_path: document
                .file_path
                .as_ref()
                .map(|path| path.display().to_string()),
            objects,
        }))
    }
}
