//! Collection of general or specifc algorithms which may be useful
//! to any kind of localization or pose tracking implementations

pub mod camera;
pub mod intrinsics;
pub mod resection;
