//! View frustum for tile visibility culling

use glam::{Mat4, Vec3, Vec4};

use super::tile::TileCoord;

/// Axis-aligned bounding box in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_center_half_extent(center: Vec3, half: Vec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// Six-plane view frustum.
///
/// Planes point inward: a point `p` is inside a plane when
/// `plane.xyz · p + plane.w >= 0`.
#[derive(Debug, Clone)]
pub struct Frustum {
    /// [left, right, bottom, top, near, far]
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extract planes from a combined view-projection matrix.
    /// Assumes the 0..1 clip depth range used by `Mat4::perspective_rh`.
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(normalize_plane);

        Self { planes }
    }

    /// Conservative box test: `false` only when the box lies entirely
    /// outside at least one plane
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            // Corner furthest along the plane normal
            let positive = Vec3::new(
                if plane.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.truncate().dot(positive) + plane.w >= 0.0
        })
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let length = plane.truncate().length();
    if length > f32::EPSILON {
        plane / length
    } else {
        plane
    }
}

/// Bounding cube of a tile: `tile_size` wide on the horizontal axes and
/// `tile_size` tall, centered on the terrain plane
pub fn tile_bounds(coord: TileCoord, tile_size: u32) -> Aabb {
    let half = tile_size as f32 * 0.5;
    Aabb::from_center_half_extent(coord.center(tile_size), Vec3::splat(half))
}

/// Whether any part of the tile's bounding cube is inside the frustum
pub fn is_visible(coord: TileCoord, tile_size: u32, frustum: &Frustum) -> bool {
    frustum.intersects_aabb(&tile_bounds(coord, tile_size))
}
