mod models;
pub mod utils;

pub use models::*;
pub use utils::*;
pub mod lines;
pub mod s3_uri;
pub mod store;
