use thiserror::Error;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("atlas page {page} does not exist (atlas has {count} pages)")]
    MissingAtlasPage { page: usize, count: usize },

    #[error("atlas page of {width}x{height} exceeds the maximum page size {max}")]
    PageTooLarge { width: u32, height: u32, max: u32 },

    #[error("atlas page {page} has no pixels")]
    EmptyPage { page: usize },

    #[error("atlas page {got} uploaded out of order, expected page {expected}")]
    PageOutOfOrder { got: usize, expected: usize },

    #[error("failed to read renderer config: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse renderer config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RendererError>;
