use std::fmt;
use std::path::PathBuf;

use sdf_mesh::Mesh;
use serde::{Deserialize, Serialize};

/// Type tag of a document object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    #[serde(rename = "Part::Feature")]
    PartFeature,
    #[serde(rename = "Mesh::Feature")]
    MeshFeature,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::PartFeature => "Part::Feature",
            ObjectType::MeshFeature => "Mesh::Feature",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ObjectData<S> {
    Solid(S),
    Mesh(Mesh),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeObject<S> {
    pub name: String,
    pub label: String,
    pub data: ObjectData<S>,
    #[serde(default)]
    pub touched: bool,
}

impl<S> ShapeObject<S> {
    pub fn object_type(&self) -> ObjectType {
        match self.data {
            ObjectData::Solid(_) => ObjectType::PartFeature,
            ObjectData::Mesh(_) => ObjectType::MeshFeature,
        }
    }

    pub fn solid(&self) -> Option<&S> {
        match &self.data {
            ObjectData::Solid(solid) => Some(solid),
            ObjectData::Mesh(_) => None,
        }
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        match &self.data {
            ObjectData::Mesh(mesh) => Some(mesh),
            ObjectData::Solid(_) => None,
        }
    }
}

/// Ordered collection of shape objects, optionally backed by a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<S> {
    pub name: String,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    pub objects: Vec<ShapeObject<S>>,
}

impl<S> Document<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_path: None,
            objects: Vec::new(),
        }
    }

    pub fn add_solid(&mut self, name: &str, solid: S) -> &ShapeObject<S> {
        self.add(name, ObjectData::Solid(solid))
    }

    pub fn add_mesh(&mut self, name: &str, mesh: Mesh) -> &ShapeObject<S> {
        self.add(name, ObjectData::Mesh(mesh))
    }

    fn add(&mut self, name: &str, data: ObjectData<S>) -> &ShapeObject<S> {
        let name = self.unique_name(name);
        self.objects.push(ShapeObject {
            label: name.clone(),
            name,
            data,
            touched: true,
        });
        &self.objects[self.objects.len() - 1]
    }

    /// `Shape`, then `Shape001`, `Shape002`, ...
    fn unique_name(&self, base: &str) -> String {
        let taken = |candidate: &str| self.objects.iter().any(|o| o.name == candidate);
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}{n:03}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn first_mesh(&self) -> Option<&Mesh> {
        self.objects.iter().find_map(ShapeObject::mesh)
    }

    pub fn first_solid(&self) -> Option<&S> {
        self.objects.iter().find_map(ShapeObject::solid)
    }

    pub fn is_touched(&self) -> bool {
        self.objects.iter().any(|object| object.touched)
    }
}
