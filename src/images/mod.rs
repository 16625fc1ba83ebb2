pub mod services;

pub use services::{add_images, replace_images, UploadItem};
