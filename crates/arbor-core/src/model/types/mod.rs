//! Concrete model types.

mod carousel;
mod file;
mod text;

pub use carousel::{CAROUSEL_ITEM_ROLE, CAROUSEL_MIME_TYPE, CarouselModel};
pub use file::{FILE_MIME_TYPE, FileModel, SOURCE_ROLE};
pub use text::{TEXT_MIME_TYPE, TextModel};
