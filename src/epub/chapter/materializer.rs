//! 章节文档生成模块
//!
//! 把切分出的章节写成独立的XHTML文档，并删除被取代的旧正文文件。

use crate::epub::chapter::segmenter::ChapterUnit;
use crate::epub::config::RebuildConfig;
use crate::epub::error::{RebuildWarning, Result};
use crate::epub::link::rebase_document;
use crate::epub::markup::MarkupTree;
use crate::epub::opf::Opf;
use quick_xml::escape::escape;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// 已写入工作目录的章节文档
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFile {
    /// 清单ID
    pub id: String,
    /// 相对于OPF目录的路径
    pub href: String,
    /// 章节标题
    pub title: String,
    /// 文件绝对路径
    pub path: PathBuf,
}

/// 生成结果
#[derive(Debug, Default)]
pub struct Materialized {
    pub files: Vec<ChapterFile>,
    pub warnings: Vec<RebuildWarning>,
}

/// 生成全部章节文档
///
/// 先读取模板head，再删除旧正文文件，最后写入 `<章节ID>.xhtml`。
///
/// # 参数
/// * `opf` - 包模型
/// * `chapters` - 切分得到的章节
/// * `config` - 重建配置
///
/// # 返回值
/// * `Result<Materialized>` - 写入的章节文件与删除旧文件时的警告
pub fn materialize(
    opf: &Opf,
    chapters: &[ChapterUnit],
    config: &RebuildConfig,
) -> Result<Materialized> {
    let template_head = template_head(opf, config)?;
    if template_head.is_none() {
        debug!("没有可用的模板head，将为每个章节生成最小head");
    }
    let stylesheet = opf.stylesheet_item().map(|item| item.href.clone());

    let warnings = remove_old_content(opf, config);

    let mut files = Vec::with_capacity(chapters.len());
    for chapter in chapters {
        let href = format!("{}.xhtml", chapter.id);
        let path = opf.resolve_href(&href);
        let document = render_chapter(chapter, template_head.as_deref(), stylesheet.as_deref());
        fs::write(&path, document)?;
        debug!("写入章节 {}: {}", chapter.id, chapter.title);

        files.push(ChapterFile {
            id: chapter.id.clone(),
            href,
            title: chapter.title.clone(),
            path,
        });
    }
    info!("写入了{}个章节文档", files.len());

    Ok(Materialized { files, warnings })
}

/// 取第一个正文文档的head作为模板，其中的链接换算到OPF目录
pub fn template_head(opf: &Opf, config: &RebuildConfig) -> Result<Option<String>> {
    let Some(item) = opf.content_documents(config).into_iter().next() else {
        return Ok(None);
    };
    let source = fs::read_to_string(&item.path)?;
    let source = rebase_document(source.trim_start_matches('\u{feff}'), &item.href)?;
    let tree = MarkupTree::parse(&source)?;
    Ok(tree
        .find_first(None, "head")
        .map(|head| tree.outer_markup(head).to_string()))
}

/// 删除被章节取代的旧正文文件，失败只记录警告
pub fn remove_old_content(opf: &Opf, config: &RebuildConfig) -> Vec<RebuildWarning> {
    let mut warnings = Vec::new();
    for item in opf.old_content_items(config) {
        if !item.path.exists() {
            continue;
        }
        match fs::remove_file(&item.path) {
            Ok(()) => debug!("删除旧文件: {}", item.path.display()),
            Err(e) => {
                let warning = RebuildWarning::FileAccess {
                    path: item.path.clone(),
                    reason: e.to_string(),
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }
    warnings
}

/// 渲染单个章节文档
///
/// 正文包在 `epub:type="bodymatter chapter"` 的section中。
pub fn render_chapter(
    chapter: &ChapterUnit,
    template_head: Option<&str>,
    stylesheet_href: Option<&str>,
) -> String {
    let head = match template_head {
        Some(head) => head.to_string(),
        None => minimal_head(&chapter.title, stylesheet_href),
    };

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
{head}
<body>
<section epub:type="bodymatter chapter">
{content}
</section>
</body>
</html>
"#,
        head = head,
        content = chapter.content
    )
}

fn minimal_head(title: &str, stylesheet_href: Option<&str>) -> String {
    let mut head = format!("<head>\n<title>{}</title>\n", escape(title));
    if let Some(href) = stylesheet_href {
        head.push_str(&format!(
            "<link href=\"{}\" rel=\"stylesheet\" type=\"text/css\"/>\n",
            escape(href)
        ));
    }
    head.push_str("</head>");
    head
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn chapter(title: &str, content: &str) -> ChapterUnit {
        ChapterUnit {
            id: "ch_0".to_string(),
            title: title.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_render_with_template_head() {
        let html = render_chapter(
            &chapter("Intro", "<h1>Intro</h1><p>x</p>"),
            Some("<head><title>Book</title></head>"),
            Some("style.css"),
        );

        assert!(html.contains("<head><title>Book</title></head>"));
        assert!(!html.contains("style.css"));
        assert!(html.contains(
            "<section epub:type=\"bodymatter chapter\">\n<h1>Intro</h1><p>x</p>\n</section>"
        ));
        assert!(MarkupTree::parse(&html).is_ok());
    }

    #[test]
    fn test_render_minimal_head() {
        let html = render_chapter(&chapter("Q & A", "<h1>Q &amp; A</h1>"), None, Some("css/book.css"));

        assert!(html.contains("<title>Q &amp; A</title>"));
        assert!(html.contains(r#"<link href="css/book.css" rel="stylesheet" type="text/css"/>"#));

        let html = render_chapter(&chapter("A", "<h1>A</h1>"), None, None);
        assert!(!html.contains("<link"));
    }

    const OPF: &str = r#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
<manifest>
<item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
<item id="css" href="book.css" media-type="text/css"/>
<item id="part1" href="Text/part1.xhtml" media-type="application/xhtml+xml"/>
</manifest>
<spine>
<itemref idref="cover"/>
<itemref idref="part1"/>
</spine>
</package>"#;

    fn working_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Text")).unwrap();
        fs::write(dir.path().join("cover.xhtml"), "<html><head><title>Cover</title></head><body/></html>").unwrap();
        fs::write(
            dir.path().join("Text/part1.xhtml"),
            "<html><head><title>Part</title><link href=\"../book.css\" rel=\"stylesheet\"/></head><body><h1>A</h1></body></html>",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_materialize_writes_chapters_and_removes_old_files() {
        let dir = working_dir();
        let opf = Opf::parse_xml(OPF, dir.path()).unwrap();
        let config = RebuildConfig::default();
        let chapters = vec![
            ChapterUnit {
                id: "ch_0".to_string(),
                title: "A".to_string(),
                content: "<h1>A</h1>".to_string(),
            },
            ChapterUnit {
                id: "ch_1".to_string(),
                title: "B".to_string(),
                content: "<h1>B</h1>".to_string(),
            },
        ];

        let result = materialize(&opf, &chapters, &config).unwrap();
        assert!(result.warnings.is_empty());
        assert_eq!(result.files.len(), 2);
        assert_eq!(result.files[1].href, "ch_1.xhtml");
        assert_eq!(result.files[1].path, dir.path().join("ch_1.xhtml"));

        assert!(!dir.path().join("Text/part1.xhtml").exists());
        assert!(dir.path().join("cover.xhtml").exists());

        let written = fs::read_to_string(dir.path().join("ch_0.xhtml")).unwrap();
        assert!(written.contains("<title>Part</title>"));
        assert!(written.contains(r#"<link href="book.css" rel="stylesheet"/>"#));
        assert!(!written.contains("../book.css"));
        assert!(written.contains("<h1>A</h1>"));
    }

    #[test]
    fn test_template_head_links_are_rebased() {
        let dir = working_dir();
        fs::write(
            dir.path().join("Text/part1.xhtml"),
            "<html><head><link href=\"../Styles/s.css\" rel=\"stylesheet\"/><script src=\"js/a.js\"/></head><body/></html>",
        )
        .unwrap();
        let opf = Opf::parse_xml(OPF, dir.path()).unwrap();

        let head = template_head(&opf, &RebuildConfig::default()).unwrap().unwrap();
        assert!(head.contains(r#"href="Styles/s.css""#));
        assert!(head.contains(r#"src="Text/js/a.js""#));
    }

    #[test]
    fn test_failed_removal_is_a_warning() {
        let dir = working_dir();
        // 旧正文路径上是一个目录，remove_file会失败
        fs::create_dir_all(dir.path().join("Text/part2.xhtml")).unwrap();
        let opf_xml = OPF
            .replace(
                "</manifest>",
                "<item id=\"part2\" href=\"Text/part2.xhtml\" media-type=\"application/xhtml+xml\"/>\n</manifest>",
            )
            .replace("</spine>", "<itemref idref=\"part2\"/>\n</spine>");
        let opf = Opf::parse_xml(&opf_xml, dir.path()).unwrap();
        let chapters = vec![chapter("A", "<h1>A</h1>")];

        let result = materialize(&opf, &chapters, &RebuildConfig::default()).unwrap();
        assert_eq!(result.files.len(), 1);
        assert!(dir.path().join("ch_0.xhtml").exists());
        assert!(!dir.path().join("Text/part1.xhtml").exists());
        assert_eq!(result.warnings.len(), 1);
        assert!(matches!(
            &result.warnings[0],
            RebuildWarning::FileAccess { path, .. } if path == &dir.path().join("Text/part2.xhtml")
        ));
    }

    #[test]
    fn test_template_head_skips_cover() {
        let dir = working_dir();
        let opf = Opf::parse_xml(OPF, dir.path()).unwrap();
        let head = template_head(&opf, &RebuildConfig::default()).unwrap().unwrap();
        assert!(head.starts_with("<head><title>Part</title>"));
    }

    #[test]
    fn test_no_content_documents_means_no_template() {
        let opf = Opf::parse_xml(
            r#"<package><manifest/><spine/></package>"#,
            Path::new("/nonexistent"),
        )
        .unwrap();
        assert_eq!(template_head(&opf, &RebuildConfig::default()).unwrap(), None);
    }
}
