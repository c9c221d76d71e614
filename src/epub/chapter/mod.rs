//! 章节模块
//!
//! 按标题切分正文并把每个章节写成独立文档。

pub mod materializer;
pub mod segmenter;

pub use materializer::{ChapterFile, Materialized, materialize};
pub use segmenter::{
    ChapterUnit,
    ContentDocument,
    Segmenter,
    load_content_documents,
    segment_documents,
};
