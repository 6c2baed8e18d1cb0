pub mod policy;
pub mod pricing;
pub mod shift;
pub mod technician;
