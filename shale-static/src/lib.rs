//! Shale Static File Serving Core
//!
//! Maps HTTP requests to files under a fixed root directory with:
//! - Sandbox-rooted path resolution (dotfiles never served)
//! - Directory index and trailing-slash redirect handling
//! - Content-encoding negotiation (brotli, gzip, deflate, zstd)
//! - Conditional GET and byte-range responses

mod content;
mod encoder;
mod file_server;
mod fs;
mod negotiate;

pub use encoder::EncodingWriter;
pub use file_server::{FileServer, FileServerConfig};
pub use fs::{RootedDir, clean_path};
pub use negotiate::{Encoding, NegotiateError, negotiate};
