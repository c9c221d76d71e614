//! NCX更新模块
//!
//! 用新的导航点替换navMap中原有的navPoint，navMap里的其他内容（如navInfo）原样保留。

use crate::epub::error::{RebuildWarning, Result};
use crate::epub::markup::MarkupTree;
use crate::epub::nav::TocEntry;
use crate::epub::ncx::NavMap;
use std::fs;
use std::path::Path;

/// 生成新的NCX文档
///
/// # 参数
/// * `source` - 原NCX文档
/// * `ncx_href` - NCX文件相对于OPF目录的路径
/// * `entries` - 目录条目
///
/// # 返回值
/// * `std::result::Result<String, RebuildWarning>` - 新文档，缺少navMap时为降级警告
pub fn rewrite_ncx(
    source: &str,
    ncx_href: &str,
    entries: &[TocEntry],
) -> Result<std::result::Result<String, RebuildWarning>> {
    let tree = MarkupTree::parse(source)?;
    let Some(nav_map) = tree.find_first(None, "navMap") else {
        return Ok(Err(RebuildWarning::DegradedUpdate {
            target: "NCX".to_string(),
            reason: "未找到navMap元素".to_string(),
        }));
    };

    let points = NavMap::from_entries(ncx_href, entries).render("    ");
    let node = tree.node(nav_map);

    let output = match &node.inner {
        Some(inner) => {
            let existing: Vec<_> = node
                .children
                .iter()
                .copied()
                .filter(|&child| tree.is_element(child, "navPoint"))
                .collect();
            match (existing.first(), existing.last()) {
                (Some(&first), Some(&last)) => {
                    // 从第一个navPoint所在行的行首替换到最后一个navPoint之后的换行
                    let start = line_start(source, tree.node(first).outer.start);
                    let end = line_end(source, tree.node(last).outer.end);
                    format!("{}{}{}", &source[..start], points, &source[end..])
                }
                _ => {
                    let at = inner.end;
                    let lead = if source[..at].ends_with('\n') { "" } else { "\n" };
                    format!("{}{}{}  {}", &source[..at], lead, points, &source[at..])
                }
            }
        }
        None => format!(
            "{}<navMap>\n{}  </navMap>{}",
            &source[..node.outer.start],
            points,
            &source[node.outer.end..]
        ),
    };
    Ok(Ok(output))
}

/// 位置之前只有空白时退到行首
fn line_start(source: &str, position: usize) -> usize {
    let before = &source[..position];
    let line_begin = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    if before[line_begin..].trim().is_empty() {
        line_begin
    } else {
        position
    }
}

/// 位置之后只有空白直到换行时前进到下一行行首
fn line_end(source: &str, position: usize) -> usize {
    let after = &source[position..];
    match after.find('\n') {
        Some(i) if after[..i].trim().is_empty() => position + i + 1,
        _ => position,
    }
}

/// 更新磁盘上的NCX文件
pub fn update_ncx(path: &Path, ncx_href: &str, entries: &[TocEntry]) -> Result<Option<RebuildWarning>> {
    let source = fs::read_to_string(path)?;
    match rewrite_ncx(source.trim_start_matches('\u{feff}'), ncx_href, entries)? {
        Ok(output) => {
            fs::write(path, output)?;
            Ok(None)
        }
        Err(warning) => Ok(Some(warning)),
    }
}
