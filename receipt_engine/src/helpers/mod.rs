mod content_hash;

pub use content_hash::content_hash;
