//! 元数据同步模块
//!
//! 用同一份章节列表依次更新清单与脊柱、导航文档和NCX，保证四处引用一致。

use crate::epub::chapter::ChapterFile;
use crate::epub::config::{RebuildConfig, XHTML_MEDIA_TYPE};
use crate::epub::error::{RebuildWarning, Result};
use crate::epub::link::{document_dir, rebase_url};
use crate::epub::nav::{TocEntry, navigation_targets, update_navigation_document};
use crate::epub::ncx::{Ncx, update_ncx};
use crate::epub::opf::{EntryRole, ManifestItem, Opf, SpineItem, rewrite_package_document};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// 构建目录条目：封面在前，随后按顺序列出章节
pub fn toc_entries(opf: &Opf, chapters: &[ChapterFile], config: &RebuildConfig) -> Vec<TocEntry> {
    let cover = opf
        .cover_item(config)
        .map(|item| TocEntry::new(config.cover_label.clone(), item.href.clone()));
    cover
        .into_iter()
        .chain(
            chapters
                .iter()
                .map(|chapter| TocEntry::new(chapter.title.clone(), chapter.href.clone())),
        )
        .collect()
}

/// 更新包模型中的清单与脊柱
///
/// 删除旧正文清单项并登记章节。脊柱只保留导航文档与封面，
/// 章节按顺序插在它们之后。
pub fn update_package_model(opf: &mut Opf, chapters: &[ChapterFile], config: &RebuildConfig) {
    let old_ids: Vec<String> = opf
        .old_content_items(config)
        .into_iter()
        .map(|item| item.id.clone())
        .collect();
    for id in &old_ids {
        opf.remove_item(id);
    }
    debug!("从清单中移除了{}个旧正文项", old_ids.len());

    for chapter in chapters {
        let mut item = ManifestItem::new(
            chapter.id.clone(),
            chapter.href.clone(),
            XHTML_MEDIA_TYPE.to_string(),
            chapter.path.clone(),
        );
        if let Some(existing) = opf.get_manifest_item(&chapter.id) {
            item.properties = existing.properties.clone();
        }
        opf.upsert_item(item);
    }

    let spine = std::mem::take(&mut opf.spine);
    let mut kept: Vec<SpineItem> = spine
        .into_iter()
        .filter(|spine_item| {
            matches!(
                opf.get_manifest_item(&spine_item.idref)
                    .map(|item| item.role(config)),
                Some(EntryRole::Navigation | EntryRole::Cover)
            )
        })
        .collect();
    // 保留下来的只有导航与封面，插入点就在最后一个之后
    kept.extend(
        chapters
            .iter()
            .map(|chapter| SpineItem::new(chapter.id.clone())),
    );
    opf.spine = kept;
}

/// 把包模型写回OPF文件
pub fn write_package_document(opf: &Opf) -> Result<()> {
    let source = fs::read_to_string(&opf.path)?;
    let output = rewrite_package_document(source.trim_start_matches('\u{feff}'), opf)?;
    fs::write(&opf.path, output)?;
    debug!("写回OPF文件: {}", opf.path.display());
    Ok(())
}

/// 同步全部元数据
///
/// 清单与脊柱的更新失败是致命错误；导航文档与NCX的问题只产生警告。
///
/// # 参数
/// * `opf` - 包模型，会被原地修改
/// * `chapters` - 已写入的章节文件
/// * `config` - 重建配置
///
/// # 返回值
/// * `Result<Vec<RebuildWarning>>` - 同步过程中的警告
pub fn synchronize(
    opf: &mut Opf,
    chapters: &[ChapterFile],
    config: &RebuildConfig,
) -> Result<Vec<RebuildWarning>> {
    let entries = toc_entries(opf, chapters, config);
    let nav = opf.nav_item(config).map(|item| (item.href.clone(), item.path.clone()));
    let ncx = opf.ncx_item().map(|item| (item.href.clone(), item.path.clone()));

    update_package_model(opf, chapters, config);
    write_package_document(opf)?;
    info!("清单与脊柱已更新，共{}个章节", chapters.len());

    let mut warnings = Vec::new();
    let nav_updated = match &nav {
        Some((href, path)) => {
            let warning = degrade("导航文档", path, update_navigation_document(path, href, &entries));
            let updated = warning.is_none();
            warnings.extend(warning);
            updated
        }
        None => {
            debug!("没有导航文档，跳过");
            false
        }
    };
    let ncx_updated = match &ncx {
        Some((href, path)) => {
            let warning = degrade("NCX", path, update_ncx(path, href, &entries));
            let updated = warning.is_none();
            warnings.extend(warning);
            updated
        }
        None => {
            debug!("没有NCX文件，跳过");
            false
        }
    };

    // 两处都成功更新时才回读核对
    if let (true, true, Some((nav_href, nav_path)), Some((ncx_href, ncx_path))) =
        (nav_updated, ncx_updated, &nav, &ncx)
    {
        let result = check_toc_consistency(
            (nav_href.as_str(), nav_path.as_path()),
            (ncx_href.as_str(), ncx_path.as_path()),
        );
        warnings.extend(degrade("目录核对", ncx_path, result));
    }

    Ok(warnings)
}

/// 回读导航文档与NCX，核对两者按同样顺序指向同一组目标
///
/// 两边的链接都换算到OPF目录后再比较。
///
/// # 参数
/// * `nav` - 导航文档的href与路径
/// * `ncx` - NCX文件的href与路径
///
/// # 返回值
/// * `Result<Option<RebuildWarning>>` - 不一致时返回警告
pub fn check_toc_consistency(
    (nav_href, nav_path): (&str, &Path),
    (ncx_href, ncx_path): (&str, &Path),
) -> Result<Option<RebuildWarning>> {
    let nav_targets: Vec<String> = navigation_targets(&fs::read_to_string(nav_path)?)?
        .iter()
        .map(|url| rebase_url(url, document_dir(nav_href)))
        .collect();
    let ncx_targets: Vec<String> = Ncx::parse_xml(&fs::read_to_string(ncx_path)?)?
        .get_chapter_paths()
        .iter()
        .map(|url| rebase_url(url, document_dir(ncx_href)))
        .collect();

    if nav_targets == ncx_targets {
        debug!("导航文档与NCX一致，共{}项", nav_targets.len());
        return Ok(None);
    }
    Ok(Some(RebuildWarning::DegradedUpdate {
        target: "NCX".to_string(),
        reason: format!(
            "导航文档有{}项，NCX有{}项，两者不一致",
            nav_targets.len(),
            ncx_targets.len()
        ),
    }))
}

/// 导航更新中的任何错误都降级为警告
fn degrade(
    target: &str,
    path: &Path,
    result: Result<Option<RebuildWarning>>,
) -> Option<RebuildWarning> {
    let warning = match result {
        Ok(None) => {
            debug!("{}完成: {}", target, path.display());
            return None;
        }
        Ok(Some(warning)) => warning,
        Err(e) => RebuildWarning::DegradedUpdate {
            target: target.to_string(),
            reason: e.to_string(),
        },
    };
    warn!("{}", warning);
    Some(warning)
}
