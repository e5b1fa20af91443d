pub mod bucket;
pub mod chunker;
pub mod digest;
pub mod error;
pub mod multipart;
pub mod part;
pub mod response;
pub mod signer;
pub mod transport;

pub use error::{Error, Result};
pub use multipart::MultipartUploader;
