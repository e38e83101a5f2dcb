// ============================================================================
// mesh.rs — Luxtree
// Unit meshes shared by every ornament instance of a kind.
// ============================================================================

use std::f32::consts::{PI, TAU};

use bytemuck::{Pod, Zeroable};

use crate::distribution::ShapeKind;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
}

/// Mesh drawn for an ornament kind; fine particles are billboards and have none.
pub fn mesh_for(kind: ShapeKind) -> Option<Mesh> {
    match kind {
        ShapeKind::FineParticle => None,
        ShapeKind::OrnamentBall => Some(uv_sphere(32, 32)),
        ShapeKind::OrnamentGift => Some(unit_cube()),
    }
}

/// Radius-1 UV sphere.
pub fn uv_sphere(segments: u32, rings: u32) -> Mesh {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut mesh = Mesh::default();

    for r in 0..=rings {
        let theta = r as f32 / rings as f32 * PI;
        let (sin_t, cos_t) = theta.sin_cos();
        for s in 0..=segments {
            let phi = s as f32 / segments as f32 * TAU;
            let (sin_p, cos_p) = phi.sin_cos();
            let n = [sin_t * cos_p, cos_t, sin_t * sin_p];
            mesh.vertices.push(MeshVertex {
                position: n,
                normal: n,
            });
        }
    }

    let stride = segments + 1;
    for r in 0..rings {
        for s in 0..segments {
            let a = (r * stride + s) as u16;
            let b = a + stride as u16;
            // Skip the degenerate triangle at each pole
            if r != 0 {
                mesh.indices.extend_from_slice(&[a, a + 1, b]);
            }
            if r != rings - 1 {
                mesh.indices.extend_from_slice(&[a + 1, b + 1, b]);
            }
        }
    }
    mesh
}

/// 1x1x1 cube centered on the origin with flat face normals.
pub fn unit_cube() -> Mesh {
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        // normal, u axis, v axis
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut mesh = Mesh::default();
    for (n, u, v) in FACES {
        let base = mesh.vertices.len() as u16;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            let position = [
                n[0] * 0.5 + u[0] * su + v[0] * sv,
                n[1] * 0.5 + u[1] * su + v[1] * sv,
                n[2] * 0.5 + u[2] * su + v[2] * sv,
            ];
            mesh.vertices.push(MeshVertex { position, normal: n });
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn check_winding(mesh: &Mesh) {
        // Counter-clockwise seen from outside: face normal points away from the center
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(mesh.vertices[i as usize].position));
            let face = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(face.dot(centroid) > 0.0, "inward-facing triangle {tri:?}");
        }
    }

    #[test]
    fn sphere_is_unit_and_closed() {
        let mesh = uv_sphere(32, 32);
        assert_eq!(mesh.vertices.len(), 33 * 33);
        assert_eq!(mesh.indices.len(), 32 * (2 * 32 - 2) * 3);
        for v in &mesh.vertices {
            assert!((Vec3::from(v.position).length() - 1.0).abs() < 1e-5);
        }
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        check_winding(&mesh);
    }

    #[test]
    fn cube_faces() {
        let mesh = unit_cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        for v in &mesh.vertices {
            assert!(v.position.iter().all(|c| c.abs() <= 0.5 + 1e-6));
        }
        check_winding(&mesh);
    }

    #[test]
    fn particles_have_no_mesh() {
        assert!(mesh_for(ShapeKind::FineParticle).is_none());
        assert!(mesh_for(ShapeKind::OrnamentGift).is_some());
    }
}
