pub mod error;
pub mod image_io;

pub use error::FatError;
pub use image_io::ImageFile;
