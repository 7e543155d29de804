pub mod aabb;
pub mod plane;
pub mod shape;

pub use aabb::Aabb;
pub use plane::Plane;
pub use shape::{tet_volume, ElementShape, SideShape};
