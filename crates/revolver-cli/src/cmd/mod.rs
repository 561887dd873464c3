pub mod providers;
pub mod rotate;
pub mod validate;
pub mod version;
