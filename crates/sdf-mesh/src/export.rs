use std::fmt::Write as _;

use crate::{Mesh, face_normal};

#[inline]
fn normalize(v: [f64; 3]) -> [f64; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len <= f64::EPSILON {
        [0.0, 0.0, 0.0]
    } else {
        [v[0] / len, v[1] / len, v[2] / len]
    }
}

#[inline]
fn triangle_normal(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> [f64; 3] {
    normalize(face_normal(a, b, c))
}

pub fn to_binary_stl(mesh: &Mesh, name: &str) -> Vec<u8> {
    let mut bytes = Vec::<u8>::with_capacity(84 + mesh.triangles.len() * 50);

    let mut header = [0u8; 80];
    let name_bytes = name.as_bytes();
    let header_len = name_bytes.len().min(80);
    header[..header_len].copy_from_slice(&name_bytes[..header_len]);
    bytes.extend_from_slice(&header);

    let tri_count = mesh.triangles.len() as u32;
    bytes.extend_from_slice(&tri_count.to_le_bytes());

    for [a, b, c] in mesh.triangle_points() {
        push_f32_triplet(&mut bytes, triangle_normal(a, b, c));
        push_f32_triplet(&mut bytes, a);
        push_f32_triplet(&mut bytes, b);
        push_f32_triplet(&mut bytes, c);
        bytes.extend_from_slice(&0u16.to_le_bytes());
    }

    bytes
}

/// R12 ASCII DXF with one `3DFACE` per triangle on layer `0`.
pub fn to_dxf(meshes: &[&Mesh]) -> String {
    let mut out = String::from("0\nSECTION\n2\nENTITIES\n");
    for mesh in meshes {
        for [a, b, c] in mesh.triangle_points() {
            out.push_str("0\n3DFACE\n8\n0\n");
            // A triangle repeats its last corner as the fourth.
            for (slot, v) in [a, b, c, c].iter().enumerate() {
                let _ = write!(
                    out,
                    "1{slot}\n{:.6}\n2{slot}\n{:.6}\n3{slot}\n{:.6}\n",
                    v[0], v[1], v[2]
                );
            }
        }
    }
    out.push_str("0\nENDSEC\n0\nEOF\n");
    out
}

/// ISO 10303-21 file holding one `FACETED_BREP` per body. Faces are planar
/// `POLY_LOOP` triangles.
pub fn to_step(bodies: &[(&str, &Mesh)], timestamp: &str) -> String {
    let mut out = String::new();
    out.push_str("ISO-10303-21;\nHEADER;\n");
    out.push_str("FILE_DESCRIPTION(('faceted boundary representation'),'2;1');\n");
    let _ = writeln!(
        out,
        "FILE_NAME('{}','{}',(''),(''),'cad3d','cad3d','');",
        step_string(bodies.first().map_or("model", |(name, _)| name)),
        step_string(timestamp)
    );
    out.push_str("FILE_SCHEMA(('CONFIG_CONTROL_DESIGN'));\nENDSEC;\nDATA;\n");

    let mut next_id = 1usize;
    let mut entity = |out: &mut String, body: String| -> usize {
        let id = next_id;
        next_id += 1;
        let _ = writeln!(out, "#{id}={body};");
        id
    };

    for (name, mesh) in bodies {
        let points: Vec<usize> = mesh
            .vertices
            .iter()
            .map(|v| {
                entity(
                    &mut out,
                    format!(
                        "CARTESIAN_POINT('',({},{},{}))",
                        step_real(v[0]),
                        step_real(v[1]),
                        step_real(v[2])
                    ),
                )
            })
            .collect();

        let mut faces = Vec::with_capacity(mesh.triangles.len());
        for (index, tri) in mesh.triangles.iter().enumerate() {
            let [a, b, c] = mesh.triangle(index);
            let normal = triangle_normal(a, b, c);
            let reference = normalize([b[0] - a[0], b[1] - a[1], b[2] - a[2]]);
            let axis = entity(&mut out, format!("DIRECTION('',{})", step_triplet(normal)));
            let ref_dir = entity(&mut out, format!("DIRECTION('',{})", step_triplet(reference)));
            let placement = entity(
                &mut out,
                format!(
                    "AXIS2_PLACEMENT_3D('',#{},#{axis},#{ref_dir})",
                    points[tri[0] as usize]
                ),
            );
            let plane = entity(&mut out, format!("PLANE('',#{placement})"));
            let poly_loop = entity(
                &mut out,
                format!(
                    "POLY_LOOP('',(#{},#{},#{}))",
                    points[tri[0] as usize], points[tri[1] as usize], points[tri[2] as usize]
                ),
            );
            let bound = entity(&mut out, format!("FACE_OUTER_BOUND('',#{poly_loop},.T.)"));
            faces.push(entity(
                &mut out,
                format!("FACE_SURFACE('',(#{bound}),#{plane},.T.)"),
            ));
        }

        let face_refs = faces
            .iter()
            .map(|id| format!("#{id}"))
            .collect::<Vec<_>>()
            .join(",");
        let shell = entity(&mut out, format!("CLOSED_SHELL('',({face_refs}))"));
        entity(
            &mut out,
            format!("FACETED_BREP('{}',#{shell})", step_string(name)),
        );
    }

    out.push_str("ENDSEC;\nEND-ISO-10303-21;\n");
    out
}

fn step_real(value: f64) -> String {
    format!("{value:.6}")
}

fn step_triplet(v: [f64; 3]) -> String {
    format!("({},{},{})", step_real(v[0]), step_real(v[1]), step_real(v[2]))
}

fn step_string(value: &str) -> String {
    value.replace('\'', "''")
}

#[inline]
fn push_f32_triplet(bytes: &mut Vec<u8>, value: [f64; 3]) {
    bytes.extend_from_slice(&(value[0] as f32).to_le_bytes());
    bytes.extend_from_slice(&(value[1] as f32).to_le_bytes());
    bytes.extend_from_slice(&(value[2] as f32).to_le_bytes());
}

#[cfg(test)]
mod tests {
    use sdf_core::Solid;

    use crate::test_support::unit_cube;
    use crate::{GridConfig, extract_mesh_from_sdf};

    use super::{to_binary_stl, to_dxf, to_step};

    fn simple_mesh() -> crate::Mesh {
        crate::Mesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            triangles: vec![[0, 1, 2]],
        }
    }

    #[test]
    fn binary_stl_has_valid_size_and_triangle_count() {
        let bytes = to_binary_stl(&simple_mesh(), "test");
        assert_eq!(bytes.len(), 84 + 50);
        let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]);
        assert_eq!(count, 1);
        // Normal of the XY triangle is +Z.
        let nz = f32::from_le_bytes([bytes[92], bytes[93], bytes[94], bytes[95]]);
        assert_eq!(nz, 1.0);
    }

    #[test]
    fn dxf_writes_one_face_per_triangle() {
        let cube = unit_cube();
        let dxf = to_dxf(&[&cube]);
        assert_eq!(dxf.matches("3DFACE").count(), 12);
        assert!(dxf.starts_with("0\nSECTION\n2\nENTITIES\n"));
        assert!(dxf.ends_with("0\nEOF\n"));
    }

    #[test]
    fn step_lists_shell_and_brep_per_body() {
        let cube = unit_cube();
        let step = to_step(&[("Shape", &cube)], "2026-01-01T00:00:00");
        assert!(step.starts_with("ISO-10303-21;"));
        assert_eq!(step.matches("POLY_LOOP(").count(), 12);
        assert_eq!(step.matches("CLOSED_SHELL(").count(), 1);
        assert!(step.contains("FACETED_BREP('Shape',"));
        assert!(step.trim_end().ends_with("END-ISO-10303-21;"));
    }

    #[test]
    fn polygonized_sphere_exports_every_triangle() {
        let config = GridConfig::new([-1.5, -1.5, -1.5], [1.5, 1.5, 1.5], [24, 24, 24]);
        let mesh = extract_mesh_from_sdf(&config, &Solid::Sphere { radius: 1.0 });
        assert!(!mesh.triangles.is_empty());

        let bin = to_binary_stl(&mesh, "sphere");
        let tri_count = u32::from_le_bytes([bin[80], bin[81], bin[82], bin[83]]) as usize;
        assert_eq!(tri_count, mesh.triangles.len());
        assert_eq!(bin.len(), 84 + 50 * mesh.triangles.len());
        assert_eq!(to_dxf(&[&mesh]).matches("3DFACE").count(), mesh.triangles.len());
    }
}
