//! Render mesh resources read by colliders and written back by soft bodies.
//!
//! A [`Figure`] is the renderable attached to a scene object; each of its sub-meshes stores
//! interleaved vertex bytes described by [`VertexAttribute`]s.

use std::sync::atomic::{AtomicBool, Ordering};

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::utils::math::{
    f16_bits_to_f32, f32_to_f16_bits, f32_to_snorm16, f32_to_unorm8, snorm16_to_f32,
    unorm8_to_f32, Aabb,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexSemantic {
    Position,
    Normal,
    TexCoord,
    Color,
}

/// Storage format of a single vertex attribute component.
///
/// `Short` and `UnsignedByte` are normalized formats: writes clamp to `[-1, 1]`, so positions
/// stored this way must already be in normalized mesh space.
/// The first clamped write in a process is reported with `log::warn!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexFormat {
    Float32,
    HalfFloat,
    /// Signed normalized 16-bit, clamped to `[-1, 1]`.
    Short,
    /// Unsigned normalized 8-bit with `[-1, 1]` mapped onto `[0, 255]`.
    UnsignedByte,
}

static CLAMP_REPORTED: AtomicBool = AtomicBool::new(false);

impl VertexFormat {
    pub fn component_size(self) -> usize {
        match self {
            VertexFormat::Float32 => 4,
            VertexFormat::HalfFloat | VertexFormat::Short => 2,
            VertexFormat::UnsignedByte => 1,
        }
    }

    /// Whether `value` falls outside the range this format can store.
    pub fn clamps(self, value: f32) -> bool {
        match self {
            VertexFormat::Float32 | VertexFormat::HalfFloat => false,
            VertexFormat::Short | VertexFormat::UnsignedByte => !(-1.0..=1.0).contains(&value),
        }
    }

    fn encode(self, value: f32, out: &mut [u8]) {
        match self {
            VertexFormat::Float32 => out.copy_from_slice(&value.to_le_bytes()),
            VertexFormat::HalfFloat => out.copy_from_slice(&f32_to_f16_bits(value).to_le_bytes()),
            VertexFormat::Short => out.copy_from_slice(&f32_to_snorm16(value).to_le_bytes()),
            VertexFormat::UnsignedByte => out[0] = f32_to_unorm8(value),
        }
    }

    fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            VertexFormat::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            VertexFormat::HalfFloat => f16_bits_to_f32(u16::from_le_bytes([bytes[0], bytes[1]])),
            VertexFormat::Short => snorm16_to_f32(i16::from_le_bytes([bytes[0], bytes[1]])),
            VertexFormat::UnsignedByte => unorm8_to_f32(bytes[0]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexAttribute {
    pub semantic: VertexSemantic,
    pub format: VertexFormat,
    pub components: usize,
    /// Byte offset inside one vertex.
    pub offset: usize,
}

impl VertexAttribute {
    pub fn byte_size(&self) -> usize {
        self.components * self.format.component_size()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderMesh {
    pub name: String,
    attributes: Vec<VertexAttribute>,
    stride: usize,
    vertex_count: usize,
    vertices: Vec<u8>,
    indices: Vec<u32>,
    #[serde(skip)]
    needs_upload: bool,
}

impl RenderMesh {
    /// Builds a mesh from raw interleaved bytes. Returns `None` when the layout does not fit.
    pub fn from_raw(
        name: impl Into<String>,
        attributes: Vec<VertexAttribute>,
        stride: usize,
        vertices: Vec<u8>,
        indices: Vec<u32>,
    ) -> Option<Self> {
        if stride == 0 || vertices.len() % stride != 0 {
            return None;
        }
        if attributes
            .iter()
            .any(|attribute| attribute.offset + attribute.byte_size() > stride)
        {
            return None;
        }
        let vertex_count = vertices.len() / stride;
        if indices.iter().any(|index| *index as usize >= vertex_count) {
            return None;
        }
        Some(Self {
            name: name.into(),
            attributes,
            stride,
            vertex_count,
            vertices,
            indices,
            needs_upload: true,
        })
    }

    /// Interleaves positions and optional normals with the given formats.
    pub fn from_positions(
        name: impl Into<String>,
        positions: &[Vec3],
        normals: Option<&[Vec3]>,
        indices: Vec<u32>,
        position_format: VertexFormat,
        normal_format: VertexFormat,
    ) -> Option<Self> {
        let mut attributes = vec![VertexAttribute {
            semantic: VertexSemantic::Position,
            format: position_format,
            components: 3,
            offset: 0,
        }];
        let mut stride = 3 * position_format.component_size();
        if normals.is_some() {
            attributes.push(VertexAttribute {
                semantic: VertexSemantic::Normal,
                format: normal_format,
                components: 3,
                offset: stride,
            });
            stride += 3 * normal_format.component_size();
        }
        // keep vertices 4-byte aligned like GPU vertex buffers
        let stride = stride.div_ceil(4) * 4;

        let mut mesh = Self::from_raw(
            name,
            attributes,
            stride,
            vec![0; positions.len() * stride],
            indices,
        )?;
        for (i, position) in positions.iter().enumerate() {
            mesh.write_attribute(i, VertexSemantic::Position, *position);
        }
        if let Some(normals) = normals {
            for (i, normal) in normals.iter().enumerate().take(positions.len()) {
                mesh.write_attribute(i, VertexSemantic::Normal, *normal);
            }
        }
        Some(mesh)
    }

    pub fn attribute(&self, semantic: VertexSemantic) -> Option<&VertexAttribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.semantic == semantic)
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        &self.vertices
    }

    /// Decodes one three-component attribute. Missing attributes or vertices yield `None`.
    pub fn read_attribute(&self, vertex: usize, semantic: VertexSemantic) -> Option<Vec3> {
        let attribute = *self.attribute(semantic)?;
        if vertex >= self.vertex_count {
            return None;
        }
        let size = attribute.format.component_size();
        let base = vertex * self.stride + attribute.offset;
        let mut value = Vec3::ZERO;
        for component in 0..attribute.components.min(3) {
            let start = base + component * size;
            value[component] = attribute.format.decode(&self.vertices[start..start + size]);
        }
        Some(value)
    }

    /// Encodes `value` into the attribute's format at `vertex * stride + offset`.
    pub fn write_attribute(&mut self, vertex: usize, semantic: VertexSemantic, value: Vec3) -> bool {
        let Some(attribute) = self.attribute(semantic).copied() else {
            return false;
        };
        if vertex >= self.vertex_count {
            return false;
        }
        let size = attribute.format.component_size();
        let base = vertex * self.stride + attribute.offset;
        for component in 0..attribute.components.min(3) {
            if attribute.format.clamps(value[component])
                && !CLAMP_REPORTED.swap(true, Ordering::Relaxed)
            {
                log::warn!(
                    "{}: {:?} value {} clamped by {:?} storage",
                    self.name,
                    semantic,
                    value[component],
                    attribute.format
                );
            }
            let start = base + component * size;
            attribute
                .format
                .encode(value[component], &mut self.vertices[start..start + size]);
        }
        true
    }

    pub fn positions(&self) -> Vec<Vec3> {
        (0..self.vertex_count)
            .filter_map(|vertex| self.read_attribute(vertex, VertexSemantic::Position))
            .collect()
    }

    pub fn local_aabb(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions())
    }

    pub fn needs_upload(&self) -> bool {
        self.needs_upload
    }

    pub fn mark_for_upload(&mut self) {
        self.needs_upload = true;
    }

    /// Called by the renderer once the vertex buffer was re-uploaded.
    pub fn take_upload_request(&mut self) -> bool {
        std::mem::take(&mut self.needs_upload)
    }
}

/// Renderable attached to a scene object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    meshes: Vec<RenderMesh>,
}

impl Figure {
    pub fn new(meshes: Vec<RenderMesh>) -> Self {
        Self { meshes }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn mesh(&self, index: usize) -> Option<&RenderMesh> {
        self.meshes.get(index)
    }

    pub fn mesh_mut(&mut self, index: usize) -> Option<&mut RenderMesh> {
        self.meshes.get_mut(index)
    }

    /// Positions of sub-mesh `index`, optionally moved into world space.
    pub fn read_positions(&self, index: usize, world: Option<&Mat4>) -> Option<Vec<Vec3>> {
        let mesh = self.mesh(index)?;
        let positions = mesh.positions();
        Some(match world {
            Some(matrix) => positions
                .into_iter()
                .map(|p| matrix.transform_point3(p))
                .collect(),
            None => positions,
        })
    }

    pub fn local_aabb(&self) -> Option<Aabb> {
        Aabb::from_points(
            self.meshes
                .iter()
                .filter_map(RenderMesh::local_aabb)
                .flat_map(|aabb| [aabb.min, aabb.max]),
        )
    }
}
