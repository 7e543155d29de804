pub mod kernel;
pub mod polygon_3d;
pub mod predicates;
pub mod scalar;

pub use kernel::{Kernel, Precision};
pub use scalar::{Scalar, Sign};

/// 2D point type.
pub type Point2 = nalgebra::Point2<f64>;

/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// 3x3 matrix type.
pub type Matrix3 = nalgebra::Matrix3<f64>;

/// Default geometric tolerance for point merging and degeneracy tests.
pub const TOLERANCE: f64 = 1e-10;
