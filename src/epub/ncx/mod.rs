//! NCX（Navigation Control file for XML）文件模块
//!
//! 提供EPUB2导航控制文件的读取，以及重建后导航地图的改写。

pub mod navigation;
pub mod parser;
pub mod writer;

pub use navigation::{NavContent, NavLabel, NavMap, NavPoint};
pub use parser::Ncx;
pub use writer::{rewrite_ncx, update_ncx};
