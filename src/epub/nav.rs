//! 导航文档模块
//!
//! 重写EPUB3导航文档中 `epub:type="toc"` 的nav元素下的有序列表。

use crate::epub::error::{RebuildWarning, Result};
use crate::epub::markup::{MarkupTree, NodeId};
use quick_xml::escape::escape;
use std::fs;
use std::path::Path;

/// 目录条目，导航文档与NCX共用同一份列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// 显示文字
    pub label: String,
    /// 目标文档，相对于OPF目录
    pub href: String,
}

impl TocEntry {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
        }
    }
}

/// 把相对于OPF目录的href转换为相对于某个文档的href
///
/// # 参数
/// * `document_href` - 当前文档相对于OPF目录的路径
/// * `target_href` - 目标相对于OPF目录的路径
pub fn relative_href(document_href: &str, target_href: &str) -> String {
    let mut depth = 0;
    let mut segments = document_href.split('/').collect::<Vec<_>>();
    segments.pop();
    for segment in segments {
        match segment {
            "" | "." => {}
            // 无法可靠回溯，保持原样
            ".." => return target_href.to_string(),
            _ => depth += 1,
        }
    }
    format!("{}{}", "../".repeat(depth), target_href)
}

/// 查找目录nav元素
fn find_toc_nav(tree: &MarkupTree<'_>) -> Option<NodeId> {
    tree.find_all(None, "nav").into_iter().find(|&nav| {
        tree.attribute(nav, "epub:type")
            .is_some_and(|value| value.split_whitespace().any(|token| token == "toc"))
    })
}

/// 生成新的导航文档
///
/// 找不到目录nav元素或其中的ol时返回警告，文档保持不变。
///
/// # 参数
/// * `source` - 原导航文档
/// * `nav_href` - 导航文档相对于OPF目录的路径
/// * `entries` - 目录条目
///
/// # 返回值
/// * `std::result::Result<String, RebuildWarning>` - 新文档或降级警告
pub fn rewrite_navigation_document(
    source: &str,
    nav_href: &str,
    entries: &[TocEntry],
) -> Result<std::result::Result<String, RebuildWarning>> {
    let degraded = |reason: &str| RebuildWarning::DegradedUpdate {
        target: "导航文档".to_string(),
        reason: reason.to_string(),
    };

    let tree = MarkupTree::parse(source)?;
    let Some(nav) = find_toc_nav(&tree) else {
        return Ok(Err(degraded("未找到epub:type=\"toc\"的nav元素")));
    };
    let Some(list) = tree.find_first(Some(nav), "ol") else {
        return Ok(Err(degraded("目录nav元素中没有ol列表")));
    };

    let mut items = String::new();
    for entry in entries {
        items.push_str(&format!(
            "\n<li><a href=\"{}\">{}</a></li>",
            escape(relative_href(nav_href, &entry.href).as_str()),
            escape(entry.label.as_str())
        ));
    }
    items.push('\n');

    let node = tree.node(list);
    let output = match &node.inner {
        Some(inner) => format!(
            "{}{}{}",
            &source[..inner.start],
            items,
            &source[inner.end..]
        ),
        // 自闭合的 <ol/>
        None => format!(
            "{}<ol>{}</ol>{}",
            &source[..node.outer.start],
            items,
            &source[node.outer.end..]
        ),
    };
    Ok(Ok(output))
}

/// 更新磁盘上的导航文档
pub fn update_navigation_document(
    path: &Path,
    nav_href: &str,
    entries: &[TocEntry],
) -> Result<Option<RebuildWarning>> {
    let source = fs::read_to_string(path)?;
    match rewrite_navigation_document(source.trim_start_matches('\u{feff}'), nav_href, entries)? {
        Ok(output) => {
            fs::write(path, output)?;
            Ok(None)
        }
        Err(warning) => Ok(Some(warning)),
    }
}

/// 按顺序读取目录列表中所有链接的href
///
/// 只读取目录nav中的第一个ol，也就是重建时改写的那个列表。
pub fn navigation_targets(source: &str) -> Result<Vec<String>> {
    let tree = MarkupTree::parse(source)?;
    let Some(list) = find_toc_nav(&tree).and_then(|nav| tree.find_first(Some(nav), "ol")) else {
        return Ok(Vec::new());
    };
    Ok(tree
        .find_all(Some(list), "a")
        .into_iter()
        .filter_map(|a| tree.attribute(a, "href").map(str::to_string))
        .collect())
}
