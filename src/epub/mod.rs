pub mod archive;
pub mod chapter;
pub mod config;
pub mod container;
pub mod error;
pub mod link;
pub mod markup;
pub mod nav;
pub mod ncx;
pub mod opf;
pub mod rebuilder;
pub mod sync;

// 重新导出错误处理
pub use error::{EpubError, RebuildWarning, Result};

// 重新导出配置与容器相关
pub use config::RebuildConfig;
pub use container::{Container, RootFile, resolve_package_document};

// 重新导出OPF相关
pub use opf::{EntryRole, ManifestItem, Opf, SpineItem};

// 重新导出章节与导航相关
pub use chapter::{ChapterFile, ChapterUnit, ContentDocument, Segmenter, segment_documents};
pub use nav::TocEntry;
pub use ncx::{NavMap, NavPoint, Ncx};

// 重新导出重建流程
pub use archive::{WorkingTree, pack, unpack};
pub use rebuilder::{RebuildReport, Rebuilder};
