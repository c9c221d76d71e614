//! NCX导航元素数据结构定义
//!
//! 定义导航点、导航标签与内容引用，并负责把导航地图渲染回NCX标记。

use crate::epub::nav::{TocEntry, relative_href};
use quick_xml::escape::escape;

/// 导航标签
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavLabel {
    /// 标签文本
    pub text: String,
}

impl NavLabel {
    /// 创建新的导航标签
    pub fn new(text: String) -> Self {
        Self { text }
    }
}

/// 导航内容引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavContent {
    /// 源文件路径，相对于NCX文件
    pub src: String,
}

impl NavContent {
    /// 创建新的导航内容引用
    pub fn new(src: String) -> Self {
        Self { src }
    }
}

/// 导航点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPoint {
    /// 唯一标识符
    pub id: String,
    /// 播放顺序
    pub play_order: u32,
    /// 导航标签
    pub nav_label: NavLabel,
    /// 内容引用
    pub content: NavContent,
}

impl NavPoint {
    /// 创建新的导航点
    pub fn new(id: String, play_order: u32, nav_label: NavLabel, content: NavContent) -> Self {
        Self {
            id,
            play_order,
            nav_label,
            content,
        }
    }

    /// 渲染为navPoint元素
    pub fn render(&self, indent: &str) -> String {
        format!(
            "{indent}<navPoint id=\"{}\" playOrder=\"{}\">\n\
             {indent}  <navLabel><text>{}</text></navLabel>\n\
             {indent}  <content src=\"{}\"/>\n\
             {indent}</navPoint>\n",
            escape(self.id.as_str()),
            self.play_order,
            escape(self.nav_label.text.as_str()),
            escape(self.content.src.as_str()),
        )
    }
}

/// 导航地图，导航点平铺存放
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavMap {
    /// 导航点列表
    pub nav_points: Vec<NavPoint>,
}

impl NavMap {
    /// 创建新的导航地图
    pub fn new() -> Self {
        Self::default()
    }

    /// 由目录条目构建平铺的导航地图
    ///
    /// playOrder从1开始连续编号，src转换为相对于NCX文件的路径。
    ///
    /// # 参数
    /// * `ncx_href` - NCX文件相对于OPF目录的路径
    /// * `entries` - 目录条目
    pub fn from_entries(ncx_href: &str, entries: &[TocEntry]) -> Self {
        let nav_points = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let order = index as u32 + 1;
                NavPoint::new(
                    format!("navPoint-{order}"),
                    order,
                    NavLabel::new(entry.label.clone()),
                    NavContent::new(relative_href(ncx_href, &entry.href)),
                )
            })
            .collect();
        Self { nav_points }
    }

    /// 添加导航点
    pub fn add_nav_point(&mut self, nav_point: NavPoint) {
        self.nav_points.push(nav_point);
    }

    /// 按playOrder排序导航点，playOrder相同的保持原顺序
    pub fn sort_by_play_order(&mut self) {
        self.nav_points.sort_by_key(|point| point.play_order);
    }

    /// 渲染全部导航点
    pub fn render(&self, indent: &str) -> String {
        self.nav_points
            .iter()
            .map(|point| point.render(indent))
            .collect()
    }
}
