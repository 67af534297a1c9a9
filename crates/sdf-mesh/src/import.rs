use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::Mesh;

#[derive(Debug, thiserror::Error)]
pub enum MeshIoError {
    #[error("{format} data is truncated: expected {expected} bytes, found {actual}")]
    Truncated {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{format} line {line}: {message}")]
    Malformed {
        format: &'static str,
        line: usize,
        message: String,
    },
    #[error("{format} face references vertex {index} but only {count} exist")]
    IndexOutOfRange {
        format: &'static str,
        index: i64,
        count: usize,
    },
    #[error("{0} is not supported")]
    Unsupported(String),
    #[error("{0} file contains no faces")]
    Empty(&'static str),
}

fn malformed(format: &'static str, line: usize, message: impl Into<String>) -> MeshIoError {
    MeshIoError::Malformed {
        format,
        line,
        message: message.into(),
    }
}

fn parse_f64(format: &'static str, line: usize, token: &str) -> Result<f64, MeshIoError> {
    token
        .parse::<f64>()
        .map_err(|_| malformed(format, line, format!("invalid number `{token}`")))
}

/// Fan-triangulates a polygon given as vertex indices.
fn push_polygon(mesh: &mut Mesh, polygon: &[u32]) {
    for i in 1..polygon.len().saturating_sub(1) {
        mesh.triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

fn non_empty(format: &'static str, mesh: Mesh) -> Result<Mesh, MeshIoError> {
    if mesh.triangles.is_empty() {
        Err(MeshIoError::Empty(format))
    } else {
        Ok(mesh)
    }
}

/// Reads binary or ASCII STL. ASCII is detected by a leading `solid` keyword followed by
/// `facet` text, since some binary writers also start their header with `solid`.
pub fn read_stl(bytes: &[u8]) -> Result<Mesh, MeshIoError> {
    let looks_ascii = bytes.trim_ascii_start().starts_with(b"solid")
        && std::str::from_utf8(bytes).is_ok_and(|text| text.contains("facet"));
    if looks_ascii {
        // Checked above.
        let text = std::str::from_utf8(bytes).unwrap_or_default();
        read_ascii_stl(text)
    } else {
        read_binary_stl(bytes)
    }
}

fn read_binary_stl(bytes: &[u8]) -> Result<Mesh, MeshIoError> {
    if bytes.len() < 84 {
        return Err(MeshIoError::Truncated {
            format: "STL",
            expected: 84,
            actual: bytes.len(),
        });
    }
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    let expected = 84 + count * 50;
    if bytes.len() < expected {
        return Err(MeshIoError::Truncated {
            format: "STL",
            expected,
            actual: bytes.len(),
        });
    }

    let read_f32 = |offset: usize| {
        f32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as f64
    };
    let read_point = |offset: usize| [read_f32(offset), read_f32(offset + 4), read_f32(offset + 8)];

    let mesh = Mesh::from_triangle_soup((0..count).map(|i| {
        // Skip the 12-byte normal of each 50-byte record.
        let base = 84 + i * 50 + 12;
        [read_point(base), read_point(base + 12), read_point(base + 24)]
    }));
    non_empty("STL", mesh)
}

fn read_ascii_stl(text: &str) -> Result<Mesh, MeshIoError> {
    let mut triangles = Vec::new();
    let mut pending = Vec::with_capacity(3);
    for (number, line) in text.lines().enumerate() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("vertex") => {
                let coords = tokens
                    .map(|t| parse_f64("STL", number + 1, t))
                    .collect::<Result<Vec<_>, _>>()?;
                let [x, y, z] = coords[..] else {
                    return Err(malformed("STL", number + 1, "vertex needs three coordinates"));
                };
                pending.push([x, y, z]);
            }
            Some("endloop") => {
                if pending.len() < 3 {
                    return Err(malformed("STL", number + 1, "facet with fewer than three vertices"));
                }
                for i in 1..pending.len() - 1 {
                    triangles.push([pending[0], pending[i], pending[i + 1]]);
                }
                pending.clear();
            }
            _ => {}
        }
    }
    non_empty("STL", Mesh::from_triangle_soup(triangles))
}

/// Reads Wavefront OBJ `v` and `f` records; texture and normal references are ignored.
pub fn read_obj(text: &str) -> Result<Mesh, MeshIoError> {
    let mut mesh = Mesh::empty();
    for (number, line) in text.lines().enumerate() {
        let line_no = number + 1;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let coords = tokens
                    .take(3)
                    .map(|t| parse_f64("OBJ", line_no, t))
                    .collect::<Result<Vec<_>, _>>()?;
                let [x, y, z] = coords[..] else {
                    return Err(malformed("OBJ", line_no, "vertex needs three coordinates"));
                };
                mesh.vertices.push([x, y, z]);
            }
            Some("f") => {
                let count = mesh.vertices.len();
                let mut polygon = Vec::new();
                for token in tokens {
                    let head = token.split('/').next().unwrap_or(token);
                    let raw: i64 = head
                        .parse()
                        .map_err(|_| malformed("OBJ", line_no, format!("invalid index `{token}`")))?;
                    // Negative indices count back from the latest vertex.
                    let resolved = if raw < 0 { count as i64 + raw } else { raw - 1 };
                    if resolved < 0 || resolved >= count as i64 {
                        return Err(MeshIoError::IndexOutOfRange {
                            format: "OBJ",
                            index: raw,
                            count,
                        });
                    }
                    polygon.push(resolved as u32);
                }
                if polygon.len() < 3 {
                    return Err(malformed("OBJ", line_no, "face needs at least three vertices"));
                }
                push_polygon(&mut mesh, &polygon);
            }
            _ => {}
        }
    }
    non_empty("OBJ", mesh)
}

/// Reads ASCII PLY with `vertex` and `face` elements.
pub fn read_ply(text: &str) -> Result<Mesh, MeshIoError> {
    let mut lines = text.lines().enumerate();
    match lines.next() {
        Some((_, magic)) if magic.trim() == "ply" => {}
        _ => return Err(malformed("PLY", 1, "missing `ply` magic")),
    }

    // (element name, count, property names)
    let mut elements: Vec<(String, usize, Vec<String>)> = Vec::new();
    loop {
        let Some((number, line)) = lines.next() else {
            return Err(malformed("PLY", 0, "header is not terminated"));
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["format", kind, ..] if *kind != "ascii" => {
                return Err(MeshIoError::Unsupported(format!("PLY format `{kind}`")));
            }
            ["element", name, count] => {
                let count = count
                    .parse()
                    .map_err(|_| malformed("PLY", number + 1, "invalid element count"))?;
                elements.push((name.to_string(), count, Vec::new()));
            }
            ["property", .., name] => {
                if let Some((_, _, properties)) = elements.last_mut() {
                    properties.push(name.to_string());
                }
            }
            ["end_header"] => break,
            _ => {}
        }
    }

    let mut mesh = Mesh::empty();
    for (name, count, properties) in &elements {
        let axis_slots = ["x", "y", "z"].map(|axis| properties.iter().position(|p| p == axis));
        for _ in 0..*count {
            let Some((number, line)) = lines.next() else {
                return Err(malformed("PLY", 0, format!("missing {name} records")));
            };
            let line_no = number + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match name.as_str() {
                "vertex" => {
                    let mut point = [0.0; 3];
                    for (axis, slot) in axis_slots.iter().enumerate() {
                        let Some(slot) = slot else {
                            return Err(malformed("PLY", line_no, "vertex lacks x/y/z"));
                        };
                        let token = tokens
                            .get(*slot)
                            .ok_or_else(|| malformed("PLY", line_no, "short vertex record"))?;
                        point[axis] = parse_f64("PLY", line_no, token)?;
                    }
                    mesh.vertices.push(point);
                }
                "face" => {
                    let indices = tokens
                        .iter()
                        .map(|t| {
                            t.parse::<usize>()
                                .map_err(|_| malformed("PLY", line_no, format!("invalid index `{t}`")))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    let Some((&n, rest)) = indices.split_first() else {
                        return Err(malformed("PLY", line_no, "empty face record"));
                    };
                    if n < 3 || rest.len() < n {
                        return Err(malformed("PLY", line_no, "face needs at least three vertices"));
                    }
                    let mut polygon = Vec::with_capacity(n);
                    for &index in &rest[..n] {
                        if index >= mesh.vertices.len() {
                            return Err(MeshIoError::IndexOutOfRange {
                                format: "PLY",
                                index: index as i64,
                                count: mesh.vertices.len(),
                            });
                        }
                        polygon.push(index as u32);
                    }
                    push_polygon(&mut mesh, &polygon);
                }
                _ => {}
            }
        }
    }
    non_empty("PLY", mesh)
}

/// Reads the `3DFACE` entities of an ASCII DXF. Other entities are skipped.
pub fn read_dxf(text: &str) -> Result<Mesh, MeshIoError> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut triangles = Vec::new();
    let mut face: Option<[[f64; 3]; 4]> = None;

    let mut flush = |face: &mut Option<[[f64; 3]; 4]>| {
        if let Some([a, b, c, d]) = face.take() {
            triangles.push([a, b, c]);
            if d != c {
                triangles.push([a, c, d]);
            }
        }
    };

    for (pair, chunk) in lines.chunks(2).enumerate() {
        let [code, value] = chunk else { break };
        let line_no = pair * 2 + 1;
        let code: u16 = code
            .parse()
            .map_err(|_| malformed("DXF", line_no, format!("invalid group code `{code}`")))?;
        match code {
            0 => {
                flush(&mut face);
                if *value == "3DFACE" {
                    face = Some([[0.0; 3]; 4]);
                }
            }
            10..=13 | 20..=23 | 30..=33 => {
                if let Some(corners) = face.as_mut() {
                    let corner = (code % 10) as usize;
                    let axis = (code / 10 - 1) as usize;
                    corners[corner][axis] = parse_f64("DXF", line_no + 1, value)?;
                }
            }
            _ => {}
        }
    }
    flush(&mut face);

    non_empty("DXF", Mesh::from_triangle_soup(triangles))
}

static STEP_POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"#(\d+)\s*=\s*CARTESIAN_POINT\s*\(\s*'[^']*'\s*,\s*\(([^)]*)\)\s*\)")
        .expect("Invalid CARTESIAN_POINT regex")
});

static STEP_POLY_LOOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"POLY_LOOP\s*\(\s*'[^']*'\s*,\s*\(([^)]*)\)\s*\)")
        .expect("Invalid POLY_LOOP regex")
});

/// Reads faceted STEP data: every `POLY_LOOP` becomes a polygon. Files made only of
/// analytic B-rep surfaces are rejected.
pub fn read_step(text: &str) -> Result<Mesh, MeshIoError> {
    let mut point_index = HashMap::<u64, u32>::new();
    let mut mesh = Mesh::empty();
    for captures in STEP_POINT.captures_iter(text) {
        let id: u64 = captures[1]
            .parse()
            .map_err(|_| malformed("STEP", 0, "invalid entity id"))?;
        let coords = captures[2]
            .split(',')
            .map(|t| parse_f64("STEP", 0, t.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        let [x, y, z] = coords[..] else {
            return Err(malformed("STEP", 0, format!("point #{id} is not three-dimensional")));
        };
        point_index.insert(id, mesh.vertices.len() as u32);
        mesh.vertices.push([x, y, z]);
    }

    for captures in STEP_POLY_LOOP.captures_iter(text) {
        let mut polygon = Vec::new();
        for reference in captures[1].split(',') {
            let id: u64 = reference
                .trim()
                .trim_start_matches('#')
                .parse()
                .map_err(|_| malformed("STEP", 0, format!("invalid reference `{reference}`")))?;
            let index = point_index
                .get(&id)
                .ok_or_else(|| malformed("STEP", 0, format!("unknown point #{id}")))?;
            polygon.push(*index);
        }
        push_polygon(&mut mesh, &polygon);
    }

    if mesh.triangles.is_empty() && !mesh.vertices.is_empty() {
        return Err(MeshIoError::Unsupported(
            "STEP without faceted POLY_LOOP geometry".to_string(),
        ));
    }
    non_empty("STEP", mesh)
}
