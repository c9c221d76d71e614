//! 清单模块
//!
//! 提供EPUB包中文件清单的结构定义，以及重建时使用的统一分类规则。

use crate::epub::config::{CHAPTER_ID_PREFIX, RebuildConfig, XHTML_MEDIA_TYPE};
use std::path::PathBuf;

/// NCX文件的媒体类型
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// 清单项在重建过程中的角色
///
/// 拆分、删除旧文件与更新清单三处共用同一套分类，保证处理的是同一批文件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRole {
    /// EPUB3导航文档
    Navigation,
    /// 封面页
    Cover,
    /// 已生成的章节文档
    Chapter,
    /// NCX导航控制文件
    LegacyNavigation,
    /// 待拆分的正文文档
    Content,
    /// 图片、样式、字体等资源
    Resource,
}

/// 清单项信息
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestItem {
    /// 项目ID
    pub id: String,
    /// 文件路径(相对于OPF文件)
    pub href: String,
    /// 媒体类型
    pub media_type: String,
    /// 属性(如nav、cover-image等)
    pub properties: Option<String>,
    /// 解析后的文件绝对路径
    pub path: PathBuf,
}

impl ManifestItem {
    /// 创建新的清单项
    pub fn new(id: String, href: String, media_type: String, path: PathBuf) -> Self {
        Self {
            id,
            href,
            media_type,
            properties: None,
            path,
        }
    }

    /// 检查是否包含指定属性
    pub fn has_property(&self, property: &str) -> bool {
        if let Some(properties) = &self.properties {
            properties.split_whitespace().any(|p| p == property)
        } else {
            false
        }
    }

    /// 检查是否为导航文档
    pub fn is_nav(&self) -> bool {
        self.has_property("nav")
    }

    /// 检查是否为CSS文件
    pub fn is_css(&self) -> bool {
        self.media_type == "text/css"
    }

    /// 检查是否为XHTML文件
    pub fn is_xhtml(&self) -> bool {
        self.media_type == XHTML_MEDIA_TYPE
    }

    /// 检查是否为NCX文件
    pub fn is_ncx(&self) -> bool {
        self.media_type == NCX_MEDIA_TYPE
    }

    /// 检查是否为生成的章节
    pub fn is_chapter(&self) -> bool {
        self.id.starts_with(CHAPTER_ID_PREFIX)
    }

    /// 按配置判断清单项的角色
    pub fn role(&self, config: &RebuildConfig) -> EntryRole {
        if self.is_nav() || config.is_nav_href(&self.href) {
            EntryRole::Navigation
        } else if config.is_cover_href(&self.href) {
            EntryRole::Cover
        } else if self.is_chapter() {
            EntryRole::Chapter
        } else if self.is_ncx() {
            EntryRole::LegacyNavigation
        } else if self.is_xhtml() {
            EntryRole::Content
        } else {
            EntryRole::Resource
        }
    }
}
