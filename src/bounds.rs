use bevy::{math::Vec3, prelude::Transform};
use bevy_camera::primitives::Aabb;

/// Transform the eight corners of `aabb` and return their (min, max).
pub fn transformed_corners(transform: &Transform, aabb: &Aabb) -> (Vec3, Vec3) {
    let center: Vec3 = Vec3::from(aabb.center);
    let half: Vec3 = Vec3::from(aabb.half_extents);
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for &sx in &[-1.0f32, 1.0f32] {
        for &sy in &[-1.0f32, 1.0f32] {
            for &sz in &[-1.0f32, 1.0f32] {
                let local_corner = center + Vec3::new(sx * half.x, sy * half.y, sz * half.z);
                let corner = transform.transform_point(local_corner);
                min = min.min(corner);
                max = max.max(corner);
            }
        }
    }
    (min, max)
}

/// Union of the transformed bounds of every (Transform, Aabb) pair.
/// Returns `None` if the iterator is empty.
pub fn union_bounds<'a, I>(pairs: I) -> Option<Aabb>
where
    I: IntoIterator<Item = (&'a Transform, &'a Aabb)>,
{
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    let mut any = false;
    for (transform, aabb) in pairs {
        let (corner_min, corner_max) = transformed_corners(transform, aabb);
        min = min.min(corner_min);
        max = max.max(corner_max);
        any = true;
    }

    any.then(|| Aabb::from_min_max(min, max))
}
