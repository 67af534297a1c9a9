use std::fs;
use std::io::Write;
use std::path::Path;

use sdf_core::{Affine3, Point3, Solid, SolidError};
use sdf_mesh::{Mesh, polygonize, read_dxf, read_obj, read_ply, read_step, read_stl};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{EngineError, GeometryEngine, InterchangeFormat, ShapeProperties};
use crate::config::{DEFAULT_MAX_GRID_RESOLUTION, DEFAULT_TESSELLATION_TOLERANCE, PipelineConfig};
use crate::document::{Document, ObjectData};

const SNAPSHOT_FORMAT: &str = "cad3d-document";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotOut<'a> {
    format: &'a str,
    version: u32,
    document: &'a Document<Solid>,
}

#[derive(Deserialize)]
struct SnapshotIn {
    format: String,
    version: u32,
    document: Document<Solid>,
}

/// Geometry engine backed by signed distance fields and a grid polygonizer.
#[derive(Debug, Clone, Copy)]
pub struct SdfEngine {
    tolerance: f64,
    max_grid_resolution: usize,
}

impl Default for SdfEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TESSELLATION_TOLERANCE, DEFAULT_MAX_GRID_RESOLUTION)
    }
}

impl SdfEngine {
    pub fn new(tolerance: f64, max_grid_resolution: usize) -> Self {
        Self {
            tolerance,
            max_grid_resolution: max_grid_resolution.max(2),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.tessellation_tolerance, config.max_grid_resolution)
    }

    fn mesh_of<'a>(&self, data: &'a ObjectData<Solid>) -> Result<MeshRef<'a>, EngineError> {
        match data {
            ObjectData::Mesh(mesh) => Ok(MeshRef::Borrowed(mesh)),
            ObjectData::Solid(solid) => self
                .tessellate(solid, self.tolerance)
                .map(MeshRef::Owned),
        }
    }
}

enum MeshRef<'a> {
    Borrowed(&'a Mesh),
    Owned(Mesh),
}

impl MeshRef<'_> {
    fn get(&self) -> &Mesh {
        match self {
            MeshRef::Borrowed(mesh) => mesh,
            MeshRef::Owned(mesh) => mesh,
        }
    }
}

/// Writes through a temp file in the target directory, then renames over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|err| EngineError::io(dir, err))?;
    let mut file = NamedTempFile::new_in(dir).map_err(|err| EngineError::io(dir, err))?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|err| EngineError::io(path, err))?;
    file.persist(path)
        .map_err(|err| EngineError::io(path, err.error))?;
    Ok(())
}

fn read_text(path: &Path) -> Result<String, EngineError> {
    fs::read_to_string(path).map_err(|err| EngineError::io(path, err))
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

impl GeometryEngine for SdfEngine {
    type Solid = Solid;

    fn make_box(&self, width: f64, depth: f64, height: f64) -> Result<Solid, EngineError> {
        Ok(Solid::cuboid(width, depth, height)?)
    }

    fn make_cylinder(&self, radius: f64, height: f64) -> Result<Solid, EngineError> {
        Ok(Solid::cylinder(radius, height)?)
    }

    fn make_sphere(&self, radius: f64) -> Result<Solid, EngineError> {
        Ok(Solid::sphere(radius)?)
    }

    fn make_cone(&self, radius1: f64, radius2: f64, height: f64) -> Result<Solid, EngineError> {
        Ok(Solid::cone(radius1, radius2, height)?)
    }

    fn make_torus(&self, major_radius: f64, minor_radius: f64) -> Result<Solid, EngineError> {
        Ok(Solid::torus(major_radius, minor_radius)?)
    }

    fn cut(&self, base: &Solid, tool: &Solid) -> Result<Solid, EngineError> {
        Ok(base.clone().cut(tool.clone()))
    }

    fn scale(&self, solid: &Solid, factors: Point3) -> Result<Solid, EngineError> {
        Ok(solid.clone().transformed(&Affine3::scale(factors)?)?)
    }

    fn rotate(&self, solid: &Solid, axis: Point3, angle_degrees: f64) -> Result<Solid, EngineError> {
        Ok(solid
            .clone()
            .transformed(&Affine3::rotation_degrees(axis, angle_degrees)?)?)
    }

    fn translate(&self, solid: &Solid, offset: Point3) -> Result<Solid, EngineError> {
        Ok(solid.clone().transformed(&Affine3::translation(offset)?)?)
    }

    fn tessellate(&self, solid: &Solid, tolerance: f64) -> Result<Mesh, EngineError> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(SolidError::InvalidDimension {
                name: "tolerance",
                value: tolerance,
            }
            .into());
        }
        let mesh = polygonize(solid, &solid.bounds(), tolerance, self.max_grid_resolution);
        if mesh.is_empty() {
            return Err(EngineError::EmptyTessellation);
        }
        debug!(
            triangles = mesh.triangles.len(),
            tolerance, "tessellated solid"
        );
        Ok(mesh)
    }

    fn properties(&self, solid: &Solid) -> Result<ShapeProperties, EngineError> {
        let mesh = self.tessellate(solid, self.tolerance)?;
        Ok(ShapeProperties {
            volume: mesh.volume().abs(),
            area: mesh.area(),
            bounds: mesh.bounds().unwrap_or_else(|| solid.bounds()),
        })
    }

    fn write_mesh(&self, mesh: &Mesh, path: &Path) -> Result<(), EngineError> {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("mesh");
        write_atomic(path, &sdf_mesh::to_binary_stl(mesh, name))
    }

    fn read_mesh(&self, path: &Path) -> Result<Mesh, EngineError> {
        let mesh = match extension(path).as_str() {
            "stl" => read_stl(&fs::read(path).map_err(|err| EngineError::io(path, err))?)?,
            "obj" => read_obj(&read_text(path)?)?,
            "ply" => read_ply(&read_text(path)?)?,
            other => return Err(EngineError::UnsupportedMeshFormat(other.to_string())),
        };
        Ok(mesh)
    }

    fn export_interchange(
        &self,
        document: &Document<Solid>,
        path: &Path,
        format: InterchangeFormat,
    ) -> Result<(), EngineError> {
        let meshes = document
            .objects
            .iter()
            .map(|object| self.mesh_of(&object.data))
            .collect::<Result<Vec<_>, _>>()?;

        let text = match format {
            InterchangeFormat::Step => {
                let bodies: Vec<(&str, &Mesh)> = document
                    .objects
                    .iter()
                    .zip(&meshes)
                    .map(|(object, mesh)| (object.label.as_str(), mesh.get()))
                    .collect();
                let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
                sdf_mesh::to_step(&bodies, &timestamp)
            }
            InterchangeFormat::Dxf => {
                let refs: Vec<&Mesh> = meshes.iter().map(MeshRef::get).collect();
                sdf_mesh::to_dxf(&refs)
            }
        };
        write_atomic(path, text.as_bytes())
    }

    fn import_interchange(
        &self,
        path: &Path,
        format: InterchangeFormat,
    ) -> Result<Mesh, EngineError> {
        let text = read_text(path)?;
        let mesh = match format {
            InterchangeFormat::Step => read_step(&text)?,
            InterchangeFormat::Dxf => read_dxf(&text)?,
        };
        Ok(mesh)
    }

    fn save_document(&self, document: &Document<Solid>, path: &Path) -> Result<(), EngineError> {
        let snapshot = SnapshotOut {
            format: SNAPSHOT_FORMAT,
            version: SNAPSHOT_VERSION,
            document,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| EngineError::Snapshot(err.to_string()))?;
        write_atomic(path, &bytes)
    }

    fn open_document(&self, path: &Path) -> Result<Document<Solid>, EngineError> {
        let snapshot: SnapshotIn = serde_json::from_str(&read_text(path)?)
            .map_err(|err| EngineError::Snapshot(err.to_string()))?;
        if snapshot.format != SNAPSHOT_FORMAT || snapshot.version != SNAPSHOT_VERSION {
            return Err(EngineError::Snapshot(format!(
                "unknown snapshot {} v{}",
                snapshot.format, snapshot.version
            )));
        }
        let mut document = snapshot.document;
        for object in &mut document.objects {
            object.touched = true;
        }
        self.recompute(&mut document)?;
        document.file_path = Some(path.to_path_buf());
        Ok(document)
    }

    fn recompute(&self, document: &mut Document<Solid>) -> Result<(), EngineError> {
        for object in document.objects.iter_mut().filter(|object| object.touched) {
            if let ObjectData::Solid(solid) = &object.data {
                solid.validate()?;
            }
            object.touched = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;
    use std::fs;

    use sdf_mesh::Mesh;

    use super::SdfEngine;
    use crate::document::Document;
    use crate::engine::{EngineError, GeometryEngine, InterchangeFormat};

    fn engine() -> SdfEngine {
        SdfEngine::new(0.1, 48)
    }

    fn relative_error(actual: f64, expected: f64) -> f64 {
        ((actual - expected) / expected).abs()
    }

    #[test]
    fn box_properties_match_dimensions() {
        let engine = engine();
        let solid = engine.make_box(50.0, 20.0, 30.0).expect("box");
        let props = engine.properties(&solid).expect("properties");
        assert!(relative_error(props.volume, 30_000.0) < 0.03, "{}", props.volume);
        let expected_area = 2.0 * (50.0 * 20.0 + 50.0 * 30.0 + 20.0 * 30.0);
        assert!(relative_error(props.area, expected_area) < 0.05, "{}", props.area);
        assert!((props.bounds.max[0] - 50.0).abs() < 1.5);
        assert!(props.bounds.min[2].abs() < 1.5);
    }

    #[test]
    fn cut_removes_material() {
        let engine = engine();
        let outer = engine.make_cylinder(20.0, 40.0).expect("outer");
        let inner = engine.make_cylinder(15.0, 40.0).expect("inner");
        let tube = engine.cut(&outer, &inner).expect("cut");
        let volume = engine.properties(&tube).expect("properties").volume;
        let expected = PI * (20.0_f64.powi(2) - 15.0_f64.powi(2)) * 40.0;
        assert!(relative_error(volume, expected) < 0.1, "{volume} vs {expected}");
    }

    #[test]
    fn thin_plate_tessellates_with_default_engine() {
        let engine = SdfEngine::default();
        let plate = engine.make_box(500.0, 500.0, 1.0).expect("plate");
        let props = engine.properties(&plate).expect("properties");
        assert!(relative_error(props.volume, 250_000.0) < 0.02, "{}", props.volume);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plate.stl");
        let mesh = engine.tessellate(&plate, 0.1).expect("mesh");
        engine.write_mesh(&mesh, &path).expect("write");
        assert!(mesh.is_watertight());
        let back = engine.read_mesh(&path).expect("read");
        assert_eq!(back.triangles.len(), mesh.triangles.len());
    }

    #[test]
    fn transforms_move_bounds() {
        let engine = engine();
        let solid = engine.make_box(10.0, 10.0, 10.0).expect("box");
        let moved = engine.translate(&solid, [100.0, 0.0, 0.0]).expect("translate");
        let bounds = engine.properties(&moved).expect("properties").bounds;
        assert!(bounds.min[0] > 98.0 && bounds.max[0] < 111.0);

        let scaled = engine.scale(&solid, [2.0, 2.0, 2.0]).expect("scale");
        let volume = engine.properties(&scaled).expect("properties").volume;
        assert!(relative_error(volume, 8000.0) < 0.05, "{volume}");
    }

    #[test]
    fn invalid_inputs_are_engine_errors() {
        let engine = engine();
        assert!(matches!(engine.make_sphere(0.0), Err(EngineError::Solid(_))));
        let solid = engine.make_sphere(5.0).expect("sphere");
        assert!(matches!(
            engine.scale(&solid, [1.0, 0.0, 1.0]),
            Err(EngineError::Transform(_))
        ));
        assert!(engine.tessellate(&solid, 0.0).is_err());
    }

    #[test]
    fn stl_written_atomically_and_read_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("part.stl");
        let engine = engine();
        let mesh = engine
            .tessellate(&engine.make_sphere(5.0).expect("sphere"), 0.5)
            .expect("mesh");
        engine.write_mesh(&mesh, &path).expect("write");

        let entries: Vec<_> = fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .collect();
        assert_eq!(entries.len(), 1, "temp file left behind");

        let back = engine.read_mesh(&path).expect("read");
        assert_eq!(back.triangles.len(), mesh.triangles.len());
        assert!(matches!(
            engine.read_mesh(&dir.path().join("part.xyz")),
            Err(EngineError::UnsupportedMeshFormat(_))
        ));
    }

    #[test]
    fn step_and_dxf_exports_import_as_meshes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine();
        let mut doc = Document::new("Generated");
        doc.add_solid("Shape", engine.make_box(10.0, 10.0, 10.0).expect("box"));

        for (name, format) in [
            ("part.step", InterchangeFormat::Step),
            ("part.dxf", InterchangeFormat::Dxf),
        ] {
            let path = dir.path().join(name);
            engine
                .export_interchange(&doc, &path, format)
                .expect("export");
            let mesh = engine.import_interchange(&path, format).expect("import");
            assert!(!mesh.is_empty(), "{name}");
            assert!(relative_error(mesh.volume().abs(), 1000.0) < 0.1, "{name}");
        }
    }

    #[test]
    fn snapshot_round_trip_keeps_objects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.fcstd");
        let engine = engine();
        let mut doc = Document::new("Generated");
        doc.add_solid("Shape", engine.make_torus(30.0, 10.0).expect("torus"));
        doc.add_mesh("Scan", Mesh::empty());
        engine.recompute(&mut doc).expect("recompute");
        engine.save_document(&doc, &path).expect("save");

        let opened = engine.open_document(&path).expect("open");
        assert_eq!(opened.name, "Generated");
        assert_eq!(opened.objects.len(), 2);
        assert_eq!(opened.objects[0].solid(), doc.objects[0].solid());
        assert_eq!(opened.file_path.as_deref(), Some(path.as_path()));
        assert!(!opened.is_touched());
    }

    #[test]
    fn foreign_json_is_not_a_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.fcstd");
        let json = r#"{"format": "other", "version": 1, "document": {"name": "x", "objects": []}}"#;
        fs::write(&path, json).expect("write");
        assert!(matches!(
            engine().open_document(&path),
            Err(EngineError::Snapshot(_))
        ));
    }

    #[test]
    fn recompute_rejects_corrupt_solids() {
        let mut doc = Document::new("Generated");
        doc.add_solid("Shape", sdf_core::Solid::Sphere { radius: -1.0 });
        assert!(matches!(
            engine().recompute(&mut doc),
            Err(EngineError::Solid(_))
        ));
    }
}
