pub mod backend;
pub mod cache;

pub use backend::CdpBackend;
pub use cache::FsCache;
