pub mod epub;

// === 核心API重新导出 ===

/// EPUB章节重建器（主要接口）
pub use epub::{RebuildReport, Rebuilder};

/// 错误处理
pub use epub::{EpubError, RebuildWarning, Result};

/// 重建配置
pub use epub::RebuildConfig;

// === 底层组件（高级用法） ===

/// 容器组件
pub use epub::{Container, RootFile, resolve_package_document};

/// OPF组件
pub use epub::{EntryRole, ManifestItem, Opf, SpineItem};

/// 章节组件
pub use epub::{ChapterFile, ChapterUnit, ContentDocument, Segmenter, segment_documents};

/// 导航组件
pub use epub::{NavMap, NavPoint, Ncx, TocEntry};

/// 归档组件
pub use epub::{WorkingTree, pack, unpack};

// === 库信息 ===

/// ChapterForge库的版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// ChapterForge库的描述
pub const DESCRIPTION: &str = "按章节标题重新拆分EPUB正文并同步目录的工具库";

// === 便捷函数 ===

/// 使用给定配置重建EPUB文件
///
/// 这是 `Rebuilder::new(config)?.rebuild(input, output)` 的便捷包装函数。
///
/// # 参数
/// * `input` - 输入EPUB路径
/// * `output` - 输出EPUB路径
/// * `config` - 重建配置
///
/// # 返回值
/// * `Result<RebuildReport>` - 重建结果
///
/// # 示例
///
/// ```no_run
/// use chapterforge::RebuildConfig;
///
/// let report = chapterforge::rebuild("book.epub", "book.split.epub", RebuildConfig::default())?;
/// println!("章节数: {}", report.chapters.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn rebuild<P: AsRef<std::path::Path>, Q: AsRef<std::path::Path>>(
    input: P,
    output: Q,
    config: RebuildConfig,
) -> Result<RebuildReport> {
    Rebuilder::new(config)?.rebuild(input, output)
}
