//! 重建配置模块
//!
//! 提供章节拆分所需的配置项，支持从YAML文件加载。

use crate::epub::error::{EpubError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 新章节文档的媒体类型
pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// 章节ID前缀，生成的章节ID形如 `ch_0`
pub const CHAPTER_ID_PREFIX: &str = "ch_";

/// 章节重建配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildConfig {
    /// 用于拆分章节的标题标签（h1到h6之一）
    pub heading_tag: String,
    /// 导航文档的路径标记（不区分大小写的子串匹配）
    pub nav_markers: Vec<String>,
    /// 封面文档的路径标记（不区分大小写的子串匹配）
    pub cover_markers: Vec<String>,
    /// 目录中封面条目的显示文字
    pub cover_label: String,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            heading_tag: "h1".to_string(),
            nav_markers: vec!["nav.xhtml".to_string()],
            cover_markers: vec!["cover.xhtml".to_string()],
            cover_label: "Cover".to_string(),
        }
    }
}

impl RebuildConfig {
    /// 从YAML文件加载配置，缺省字段使用默认值
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    /// * `Result<RebuildConfig>` - 校验通过的配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| EpubError::ConfigError(format!("无法读取配置文件: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// 从YAML字符串解析配置
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: RebuildConfig = serde_yml::from_str(content)
            .map_err(|e| EpubError::ConfigError(format!("配置文件格式错误: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 将配置序列化为YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yml::to_string(self)
            .map_err(|e| EpubError::ConfigError(format!("序列化配置失败: {}", e)))
    }

    /// 校验配置，标题标签必须是h1到h6
    pub fn validate(&self) -> Result<()> {
        let tag = self.heading_tag.as_str();
        let valid = tag.len() == 2
            && tag.starts_with('h')
            && matches!(tag.as_bytes()[1], b'1'..=b'6');
        if !valid {
            return Err(EpubError::InvalidHeadingTag(self.heading_tag.clone()));
        }
        Ok(())
    }

    /// 路径是否包含导航文档标记
    pub fn is_nav_href(&self, href: &str) -> bool {
        contains_marker(href, &self.nav_markers)
    }

    /// 路径是否包含封面文档标记
    pub fn is_cover_href(&self, href: &str) -> bool {
        contains_marker(href, &self.cover_markers)
    }
}

fn contains_marker(href: &str, markers: &[String]) -> bool {
    let href = href.to_lowercase();
    markers
        .iter()
        .any(|marker| !marker.is_empty() && href.contains(&marker.to_lowercase()))
}
