use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EpubError>;

/// EPUB重建过程中的致命错误
#[derive(Error, Debug)]
pub enum EpubError {
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("Zip文件错误: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML解析错误: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("缺少container.xml: {}", .0.display())]
    MissingContainer(PathBuf),

    #[error("container.xml格式错误: {0}")]
    MalformedContainer(String),

    #[error("OPF文件中缺少manifest元素")]
    MissingManifest,

    #[error("OPF文件中缺少spine元素")]
    MissingSpine,

    #[error("重写OPF文件时未找到manifest元素")]
    MissingManifestElement,

    #[error("重写OPF文件时未找到spine元素")]
    MissingSpineElement,

    #[error("无效的章节标题标签: {0}（仅支持h1到h6）")]
    InvalidHeadingTag(String),

    #[error("配置文件错误: {0}")]
    ConfigError(String),
}

impl From<quick_xml::events::attributes::AttrError> for EpubError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        EpubError::XmlError(quick_xml::Error::InvalidAttr(err))
    }
}

/// 非致命问题：记录日志后继续执行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildWarning {
    /// 导航文档或NCX未能更新，目录将保持旧状态
    DegradedUpdate { target: String, reason: String },
    /// 旧内容文件无法删除
    FileAccess { path: PathBuf, reason: String },
}

impl fmt::Display for RebuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildWarning::DegradedUpdate { target, reason } => {
                write!(f, "跳过{}更新: {}", target, reason)
            }
            RebuildWarning::FileAccess { path, reason } => {
                write!(f, "无法删除文件 {}: {}", path.display(), reason)
            }
        }
    }
}
