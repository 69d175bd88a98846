pub mod cache;
pub mod encoder;
pub mod preflight;
pub mod save;
pub mod temp;

pub use cache::{ArtifactCache, CacheKey};
pub use encoder::{EncoderAdapter, EncoderRegistry};
pub use preflight::{preflight, DependencyReport};
pub use save::SaveReport;
pub use temp::TempArtifactManager;
