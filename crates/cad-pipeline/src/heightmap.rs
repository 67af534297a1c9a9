use std::path::Path;

use image::GrayImage;
use sdf_mesh::Mesh;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::document::Document;
use crate::error::{CadError, CadResult};

pub const HEIGHTMAP_DOCUMENT: &str = "Heightmap";
pub const HEIGHTMAP_OBJECT: &str = "HeightmapMesh";

/// Top and base grids together hold `2 * rows * cols` vertices, indexed by `u32`.
fn fits_vertex_indices(rows: u64, cols: u64) -> bool {
    rows.saturating_mul(cols).saturating_mul(2) <= u64::from(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightmapOptions {
    /// Longest image side after downsampling, in pixels.
    pub max_size: u32,
    /// Height in millimetres of a white pixel.
    pub height_scale: f64,
    /// Millimetres between neighbouring pixels.
    pub scale: f64,
}

impl Default for HeightmapOptions {
    fn default() -> Self {
        Self {
            max_size: 100,
            height_scale: 10.0,
            scale: 1.0,
        }
    }
}

impl HeightmapOptions {
    fn validate(&self) -> CadResult<()> {
        if self.max_size < 2 {
            return Err(CadError::InvalidParameters(format!(
                "max_size must be at least 2, got {}",
                self.max_size
            )));
        }
        let side = u64::from(self.max_size);
        if !fits_vertex_indices(side, side) {
            return Err(CadError::InvalidParameters(format!(
                "max_size {} needs more vertices than a mesh can index",
                self.max_size
            )));
        }
        for (name, value) in [("height_scale", self.height_scale), ("scale", self.scale)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(CadError::InvalidParameters(format!(
                    "{name} must be finite and greater than zero, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Loads an image as grayscale, shrunk to fit `max_size` but never enlarged.
pub fn load_grayscale(path: &Path, max_size: u32) -> CadResult<GrayImage> {
    if !path.is_file() {
        return Err(CadError::FileNotFound(path.to_path_buf()));
    }
    let mut image = image::open(path)?;
    if image.width() > max_size || image.height() > max_size {
        image = image.thumbnail(max_size, max_size);
    }
    Ok(image.to_luma8())
}

/// Closed solid mesh: the height field on top, a flat base at z=0 and side walls.
pub fn heightmap_mesh(image: &GrayImage, options: &HeightmapOptions) -> CadResult<Mesh> {
    options.validate()?;
    let (cols, rows) = (image.width() as usize, image.height() as usize);
    if cols < 2 || rows < 2 {
        return Err(CadError::InvalidParameters(format!(
            "heightmap needs at least 2x2 pixels, got {cols}x{rows}"
        )));
    }
    if !fits_vertex_indices(rows as u64, cols as u64) {
        return Err(CadError::InvalidParameters(format!(
            "heightmap of {cols}x{rows} pixels needs more vertices than a mesh can index"
        )));
    }

    let mut mesh = Mesh::default();
    for (x, y, pixel) in image.enumerate_pixels() {
        mesh.vertices.push([
            f64::from(x) * options.scale,
            f64::from(y) * options.scale,
            f64::from(pixel.0[0]) / 255.0 * options.height_scale,
        ]);
    }
    // Base grid at z=0 under the same pixel offsets.
    let footprint: Vec<[f64; 3]> = mesh.vertices.iter().map(|v| [v[0], v[1], 0.0]).collect();
    mesh.vertices.extend(footprint);

    let top = |i: usize, j: usize| (i * cols + j) as u32;
    let base = |i: usize, j: usize| (rows * cols + i * cols + j) as u32;

    for i in 0..rows - 1 {
        for j in 0..cols - 1 {
            let (a, b, c, d) = (top(i, j), top(i, j + 1), top(i + 1, j + 1), top(i + 1, j));
            mesh.triangles.push([a, b, c]);
            mesh.triangles.push([a, c, d]);
            let (a, b, c, d) = (base(i, j), base(i, j + 1), base(i + 1, j + 1), base(i + 1, j));
            mesh.triangles.push([a, c, b]);
            mesh.triangles.push([a, d, c]);
        }
    }

    // Boundary walk, counter-clockwise seen from above.
    let mut ring = Vec::with_capacity(2 * (rows + cols));
    ring.extend((0..cols - 1).map(|j| (0, j)));
    ring.extend((0..rows - 1).map(|i| (i, cols - 1)));
    ring.extend((1..cols).rev().map(|j| (rows - 1, j)));
    ring.extend((1..rows).rev().map(|i| (i, 0)));
    for (k, &(pi, pj)) in ring.iter().enumerate() {
        let (qi, qj) = ring[(k + 1) % ring.len()];
        let (tp, tq) = (top(pi, pj), top(qi, qj));
        let (bp, bq) = (base(pi, pj), base(qi, qj));
        mesh.triangles.push([bp, bq, tq]);
        mesh.triangles.push([bp, tq, tp]);
    }

    Ok(mesh)
}

/// Reads `path` and builds the `Heightmap` document.
pub fn heightmap_document<S>(path: &Path, options: &HeightmapOptions) -> CadResult<Document<S>> {
    options.validate()?;
    let image = load_grayscale(path, options.max_size)?;
    let mesh = heightmap_mesh(&image, options)?;
    info!(
        width = image.width(),
        height = image.height(),
        triangles = mesh.triangles.len(),
        "built heightmap"
    );
    let mut document = Document::new(HEIGHTMAP_DOCUMENT);
    document.add_mesh(HEIGHTMAP_OBJECT, mesh);
    Ok(document)
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};

    use super::{HeightmapOptions, heightmap_document, heightmap_mesh, load_grayscale};
    use crate::error::CadError;

    fn uniform(width: u32, height: u32, luma: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([luma]))
    }

    #[test]
    fn flat_image_is_a_closed_slab() {
        let options = HeightmapOptions::default();
        let mesh = heightmap_mesh(&uniform(5, 4, 255), &options).expect("mesh");
        assert!(mesh.is_watertight());
        // 4 x 3 mm footprint, 10 mm tall.
        assert!((mesh.volume() - 120.0).abs() < 1e-9, "{}", mesh.volume());
        let bounds = mesh.bounds().expect("bounds");
        assert_eq!(bounds.max, [4.0, 3.0, 10.0]);
    }

    #[test]
    fn heights_follow_luminance() {
        let image = GrayImage::from_fn(3, 3, |x, _| Luma([if x == 2 { 255 } else { 0 }]));
        let options = HeightmapOptions {
            height_scale: 2.0,
            scale: 0.5,
            ..HeightmapOptions::default()
        };
        let mesh = heightmap_mesh(&image, &options).expect("mesh");
        assert!(mesh.is_watertight());
        assert!(mesh.vertices.contains(&[1.0, 0.0, 2.0]));
        assert!(mesh.vertices.contains(&[0.5, 0.5, 0.0]));
        assert!(mesh.volume() > 0.0);
    }

    #[test]
    fn max_size_must_keep_vertex_indices_in_range() {
        let at_limit = HeightmapOptions {
            max_size: 46_340,
            ..HeightmapOptions::default()
        };
        assert!(at_limit.validate().is_ok());

        let past_limit = HeightmapOptions {
            max_size: 46_341,
            ..HeightmapOptions::default()
        };
        assert!(matches!(
            past_limit.validate(),
            Err(CadError::InvalidParameters(_))
        ));
        let huge = HeightmapOptions {
            max_size: u32::MAX,
            ..HeightmapOptions::default()
        };
        assert!(huge.validate().is_err());
    }

    #[test]
    fn tiny_images_are_rejected() {
        let err = heightmap_mesh(&uniform(1, 10, 10), &HeightmapOptions::default())
            .expect_err("too small");
        assert!(matches!(err, CadError::InvalidParameters(_)));
    }

    #[test]
    fn large_images_are_downsampled_small_ones_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let big = dir.path().join("big.png");
        uniform(40, 20, 128).save(&big).expect("save");
        let image = load_grayscale(&big, 10).expect("load");
        assert_eq!((image.width(), image.height()), (10, 5));

        let small = dir.path().join("small.png");
        uniform(6, 3, 128).save(&small).expect("save");
        let image = load_grayscale(&small, 10).expect("load");
        assert_eq!((image.width(), image.height()), (6, 3));
    }

    #[test]
    fn document_holds_one_mesh_feature() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("map.png");
        uniform(8, 8, 64).save(&path).expect("save");

        let doc: crate::document::Document<()> =
            heightmap_document(&path, &HeightmapOptions::default()).expect("document");
        assert_eq!(doc.name, "Heightmap");
        assert_eq!(doc.objects.len(), 1);
        assert_eq!(doc.objects[0].name, "HeightmapMesh");
        assert!(doc.first_mesh().is_some_and(|mesh| mesh.is_watertight()));
    }

    #[test]
    fn missing_image_is_file_not_found() {
        let err = load_grayscale(std::path::Path::new("/no/such/map.png"), 100)
            .expect_err("missing");
        assert!(matches!(err, CadError::FileNotFound(_)));
    }
}
