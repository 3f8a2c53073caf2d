use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::backend::shape::{CollisionShape, ShapeKind};
use crate::mesh::Figure;

/// Collider geometry of a physics object. Changing any of it rebuilds shape and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Collider {
    /// `size` holds half extents.
    Box { size: Vec3 },
    Sphere { radius: f32 },
    /// `height` is the distance between the two hemisphere centers, along local Y.
    Capsule { radius: f32, height: f32 },
    /// Sub-mesh of the owner's figure.
    Mesh {
        #[serde(rename = "meshIndex")]
        mesh_index: usize,
        convex: bool,
    },
}

impl Default for Collider {
    fn default() -> Self {
        Collider::Box {
            size: Vec3::splat(0.5),
        }
    }
}

impl Collider {
    pub fn is_mesh(&self) -> bool {
        matches!(self, Collider::Mesh { .. })
    }

    /// Builds the unscaled shape. Only kinematic bodies keep concave meshes; a dynamic body
    /// gets a convex hull instead.
    pub fn build_shape(&self, figure: Option<&Figure>, kinematic: bool) -> Option<CollisionShape> {
        let kind = match self {
            Collider::Box { size } => ShapeKind::Box {
                half_extents: size.abs(),
            },
            Collider::Sphere { radius } => ShapeKind::Sphere {
                radius: radius.abs(),
            },
            Collider::Capsule { radius, height } => ShapeKind::Capsule {
                radius: radius.abs(),
                height: height.abs(),
            },
            Collider::Mesh { mesh_index, convex } => {
                let mesh = figure?.mesh(*mesh_index)?;
                let points = mesh.positions();
                if points.is_empty() {
                    return None;
                }
                if *convex || !kinematic {
                    if !*convex {
                        log::warn!(
                            "concave mesh collider '{}' on a dynamic body, using its convex hull",
                            mesh.name
                        );
                    }
                    ShapeKind::ConvexHull { points }
                } else {
                    ShapeKind::TriangleMesh {
                        vertices: points,
                        indices: mesh.indices().to_vec(),
                    }
                }
            }
        };
        Some(CollisionShape::new(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{RenderMesh, VertexFormat};

    fn triangle_figure() -> Figure {
        let mesh = RenderMesh::from_positions(
            "tri",
            &[Vec3::ZERO, Vec3::X, Vec3::Z],
            None,
            vec![0, 1, 2],
            VertexFormat::Float32,
            VertexFormat::Float32,
        )
        .expect("mesh");
        Figure::new(vec![mesh])
    }

    #[test]
    fn dynamic_body_forces_convex_mesh() {
        let figure = triangle_figure();
        let collider = Collider::Mesh {
            mesh_index: 0,
            convex: false,
        };
        let dynamic = collider.build_shape(Some(&figure), false).expect("shape");
        assert!(!dynamic.is_concave());
        let kinematic = collider.build_shape(Some(&figure), true).expect("shape");
        assert!(kinematic.is_concave());
    }

    #[test]
    fn mesh_without_figure_has_no_shape() {
        let collider = Collider::Mesh {
            mesh_index: 0,
            convex: true,
        };
        assert!(collider.build_shape(None, false).is_none());
    }
}
