//! 重建流程模块
//!
//! 解压、定位OPF、切分章节、写入章节文档、同步元数据、重新打包。

use crate::epub::archive::{WorkingTree, pack};
use crate::epub::chapter::{load_content_documents, materialize, segment_documents};
use crate::epub::config::RebuildConfig;
use crate::epub::container::resolve_package_document;
use crate::epub::error::{RebuildWarning, Result};
use crate::epub::opf::Opf;
use crate::epub::sync::synchronize;
use std::path::{Path, PathBuf};
use tracing::info;

/// 重建结果
#[derive(Debug, Clone, Default)]
pub struct RebuildReport {
    /// OPF文件在包内的相对路径
    pub package_document: PathBuf,
    /// 生成的章节(ID, 标题)，按顺序排列
    pub chapters: Vec<(String, String)>,
    /// 非致命问题
    pub warnings: Vec<RebuildWarning>,
}

/// EPUB章节重建器
#[derive(Debug, Clone, Default)]
pub struct Rebuilder {
    config: RebuildConfig,
}

impl Rebuilder {
    /// 创建重建器，配置无效时返回错误
    pub fn new(config: RebuildConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 当前配置
    pub fn config(&self) -> &RebuildConfig {
        &self.config
    }

    /// 重建EPUB文件
    ///
    /// 工作目录在任何退出路径上都会被删除。
    ///
    /// # 参数
    /// * `input` - 输入EPUB路径
    /// * `output` - 输出EPUB路径
    ///
    /// # 返回值
    /// * `Result<RebuildReport>` - 重建结果
    pub fn rebuild<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> Result<RebuildReport> {
        let tree = WorkingTree::extract(input.as_ref())?;
        let report = self.rebuild_tree(tree.path())?;
        pack(tree.path(), output.as_ref())?;
        Ok(report)
    }

    /// 在已解压的目录上原地重建
    pub fn rebuild_tree(&self, root: &Path) -> Result<RebuildReport> {
        let opf_path = resolve_package_document(root)?;
        info!("OPF文件: {}", opf_path.display());
        let mut opf = Opf::load(&opf_path)?;

        let documents = load_content_documents(&opf, &self.config)?;
        let chapters = segment_documents(&documents, &self.config.heading_tag)?;
        info!(
            "从{}个正文文档中切分出{}个章节",
            documents.len(),
            chapters.len()
        );

        let materialized = materialize(&opf, &chapters, &self.config)?;
        let mut warnings = materialized.warnings;
        warnings.extend(synchronize(&mut opf, &materialized.files, &self.config)?);

        Ok(RebuildReport {
            package_document: opf_path
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| opf_path.clone()),
            chapters: materialized
                .files
                .into_iter()
                .map(|file| (file.id, file.title))
                .collect(),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::error::EpubError;
    use crate::epub::nav::navigation_targets;
    use crate::epub::ncx::Ncx;
    use std::fs::{self, File};
    use std::io::{Read, Write};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{ZipArchive, ZipWriter};

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>测试书籍</dc:title>
  </metadata>
  <manifest>
    <item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
    <item id="a" href="Text/a.xhtml" media-type="application/xhtml+xml"/>
    <item id="b" href="Text/b.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="cover"/>
    <itemref idref="nav"/>
    <itemref idref="a"/>
    <itemref idref="b"/>
  </spine>
</package>"#;

    const NAV: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>目录</title></head>
<body><nav epub:type="toc"><ol>
<li><a href="Text/a.xhtml">A</a></li>
<li><a href="Text/b.xhtml">B</a></li>
</ol></nav></body>
</html>"#;

    const NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="id"/></head>
  <docTitle><text>测试书籍</text></docTitle>
  <navMap>
    <navPoint id="a" playOrder="1"><navLabel><text>A</text></navLabel><content src="Text/a.xhtml"/></navPoint>
  </navMap>
</ncx>"#;

    fn xhtml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>正文</title></head><body>{}</body></html>"#,
            body
        )
    }

    fn create_test_epub(path: &Path, a_body: &str, b_body: &str) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let entries = [
            ("mimetype", "application/epub+zip".to_string()),
            ("META-INF/container.xml", CONTAINER.to_string()),
            ("OEBPS/content.opf", OPF.to_string()),
            ("OEBPS/cover.xhtml", xhtml("<img src=\"cover.jpg\"/>")),
            ("OEBPS/nav.xhtml", NAV.to_string()),
            ("OEBPS/toc.ncx", NCX.to_string()),
            ("OEBPS/style.css", "p { margin: 0; }".to_string()),
            ("OEBPS/Text/a.xhtml", xhtml(a_body)),
            ("OEBPS/Text/b.xhtml", xhtml(b_body)),
        ];
        for (name, content) in entries {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn read_entry(zip: &mut ZipArchive<File>, name: &str) -> Option<String> {
        let mut entry = zip.by_name(name).ok()?;
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        Some(content)
    }

    fn spine_ids(opf: &Opf) -> Vec<&str> {
        opf.spine.iter().map(|item| item.idref.as_str()).collect()
    }

    #[test]
    fn test_rebuild_splits_chapters_across_documents() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.epub");
        let output = dir.path().join("out.epub");
        create_test_epub(
            &input,
            "<h1>Intro</h1><p>one</p><p>two</p>",
            "<h1>Part One</h1><p>first</p><h1>Part Two</h1><p>second</p>",
        );

        let report = Rebuilder::default().rebuild(&input, &output).unwrap();
        let titles: Vec<_> = report.chapters.iter().map(|(_, title)| title.as_str()).collect();
        assert_eq!(titles, vec!["Intro", "Part One", "Part Two"]);
        assert_eq!(report.chapters[2].0, "ch_2");
        assert_eq!(report.package_document, PathBuf::from("OEBPS/content.opf"));
        assert!(report.warnings.is_empty());

        let mut zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        assert_eq!(zip.by_index(0).unwrap().name(), "mimetype");
        assert!(read_entry(&mut zip, "OEBPS/Text/a.xhtml").is_none());
        assert!(read_entry(&mut zip, "OEBPS/style.css").is_some());

        let part_one = read_entry(&mut zip, "OEBPS/ch_1.xhtml").unwrap();
        assert!(part_one.contains("<p>first</p>"));
        assert!(!part_one.contains("second"));
        let intro = read_entry(&mut zip, "OEBPS/ch_0.xhtml").unwrap();
        assert!(intro.contains("<h1>Intro</h1><p>one</p><p>two</p>"));

        let opf_xml = read_entry(&mut zip, "OEBPS/content.opf").unwrap();
        let opf = Opf::parse_xml(&opf_xml, Path::new("OEBPS")).unwrap();
        assert_eq!(spine_ids(&opf), vec!["cover", "nav", "ch_0", "ch_1", "ch_2"]);
        assert_eq!(opf.get_manifest_item("ch_2").unwrap().href, "ch_2.xhtml");
        assert!(opf.get_manifest_item("a").is_none());
        assert!(opf_xml.contains("<dc:title>测试书籍</dc:title>"));

        let nav = read_entry(&mut zip, "OEBPS/nav.xhtml").unwrap();
        let ncx = read_entry(&mut zip, "OEBPS/toc.ncx").unwrap();
        let nav_targets = navigation_targets(&nav).unwrap();
        assert_eq!(
            nav_targets,
            vec!["cover.xhtml", "ch_0.xhtml", "ch_1.xhtml", "ch_2.xhtml"]
        );
        assert_eq!(nav_targets, Ncx::parse_xml(&ncx).unwrap().get_chapter_paths());
    }

    #[test]
    fn test_rebuild_without_headings() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.epub");
        let output = dir.path().join("out.epub");
        create_test_epub(&input, "<p>one</p>", "<p>two</p>");

        let report = Rebuilder::default().rebuild(&input, &output).unwrap();
        assert!(report.chapters.is_empty());

        let mut zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let names: Vec<String> = zip.file_names().map(str::to_string).collect();
        assert!(!names.iter().any(|name| name.contains("ch_")));

        let opf_xml = read_entry(&mut zip, "OEBPS/content.opf").unwrap();
        let opf = Opf::parse_xml(&opf_xml, Path::new("OEBPS")).unwrap();
        assert_eq!(spine_ids(&opf), vec!["cover", "nav"]);

        let nav = read_entry(&mut zip, "OEBPS/nav.xhtml").unwrap();
        assert_eq!(navigation_targets(&nav).unwrap(), vec!["cover.xhtml"]);
    }

    #[test]
    fn test_rebuild_keeps_non_spine_documents() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let opf = OPF
            .replace(
                r#"href="Text/a.xhtml""#,
                r#"href="Text/Chapter%201.xhtml""#,
            )
            .replace(
                "  </manifest>",
                "    <item id=\"notes\" href=\"Text/notes.xhtml\" media-type=\"application/xhtml+xml\"/>\n  </manifest>",
            );
        let files = [
            ("META-INF/container.xml", CONTAINER.to_string()),
            ("OEBPS/content.opf", opf),
            ("OEBPS/cover.xhtml", xhtml("<img src=\"cover.jpg\"/>")),
            ("OEBPS/nav.xhtml", NAV.to_string()),
            ("OEBPS/toc.ncx", NCX.to_string()),
            (
                "OEBPS/Text/Chapter 1.xhtml",
                xhtml(r#"<h1>One</h1><p>see <a href="notes.xhtml#n1">1</a></p><img src="../img/a.png"/>"#),
            ),
            ("OEBPS/Text/b.xhtml", xhtml("<p>more</p>")),
            ("OEBPS/Text/notes.xhtml", xhtml(r#"<p id="n1">note</p>"#)),
        ];
        for (name, content) in files {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let report = Rebuilder::default().rebuild_tree(root).unwrap();
        assert_eq!(report.chapters.len(), 1);
        assert!(report.warnings.is_empty());

        assert!(!root.join("OEBPS/Text/Chapter 1.xhtml").exists());
        assert!(!root.join("OEBPS/Text/b.xhtml").exists());
        assert!(root.join("OEBPS/Text/notes.xhtml").exists());

        let opf = Opf::load(&root.join("OEBPS/content.opf")).unwrap();
        assert_eq!(opf.get_manifest_item("notes").unwrap().href, "Text/notes.xhtml");
        assert!(opf.get_manifest_item("a").is_none());
        assert_eq!(spine_ids(&opf), vec!["cover", "nav", "ch_0"]);

        let chapter = fs::read_to_string(root.join("OEBPS/ch_0.xhtml")).unwrap();
        assert!(chapter.contains(r#"<a href="Text/notes.xhtml#n1">1</a>"#));
        assert!(chapter.contains(r#"<img src="img/a.png"/>"#));
        assert!(chapter.contains("<p>more</p>"));
    }

    #[test]
    fn test_missing_container_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = Rebuilder::default().rebuild_tree(dir.path());
        assert!(matches!(result, Err(EpubError::MissingContainer(_))));
    }

    #[test]
    fn test_missing_container_in_archive_is_fatal() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.epub");
        let file = File::create(&input).unwrap();
        let mut zip = ZipWriter::new(file);
        zip.start_file("mimetype", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        zip.finish().unwrap();

        let result = Rebuilder::default().rebuild(&input, dir.path().join("out.epub"));
        assert!(matches!(result, Err(EpubError::MissingContainer(_))));
        assert!(!dir.path().join("out.epub").exists());
    }

    #[test]
    fn test_invalid_heading_tag_rejected() {
        let config = RebuildConfig {
            heading_tag: "p".to_string(),
            ..RebuildConfig::default()
        };
        assert!(matches!(
            Rebuilder::new(config),
            Err(EpubError::InvalidHeadingTag(_))
        ));
    }

    #[test]
    fn test_custom_heading_tag() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.epub");
        let output = dir.path().join("out.epub");
        create_test_epub(
            &input,
            "<h1>Book</h1><h2>One</h2><p>x</p>",
            "<h2>Two</h2><p>y</p>",
        );

        let config = RebuildConfig {
            heading_tag: "h2".to_string(),
            ..RebuildConfig::default()
        };
        let report = Rebuilder::new(config).unwrap().rebuild(&input, &output).unwrap();
        let titles: Vec<_> = report.chapters.iter().map(|(_, title)| title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }
}
