//! OPF（Open Packaging Format）文件模块
//!
//! 此模块提供OPF包文件的解析与重写：清单、脊柱，以及重建时对清单项的统一分类。

mod manifest;
mod parser;
mod spine;
mod writer;

pub use manifest::{EntryRole, ManifestItem, NCX_MEDIA_TYPE};
pub use parser::Opf;
pub use spine::SpineItem;
pub use writer::rewrite_package_document;
