//! 容器模块
//!
//! 解析`META-INF/container.xml`，定位OPF根文件。

use crate::epub::error::{EpubError, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fs;
use std::path::{Path, PathBuf};

/// container.xml在包内的固定位置
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// OPF根文件的媒体类型
pub const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Container.xml中的rootfile信息
#[derive(Debug, Clone)]
pub struct RootFile {
    pub full_path: String,
    pub media_type: String,
}

/// Container.xml的解析结果
#[derive(Debug, Clone)]
pub struct Container {
    pub rootfiles: Vec<RootFile>,
}

impl Container {
    /// 解析container.xml内容
    ///
    /// 按本地名称匹配元素，缺少命名空间声明的文档同样可以解析。
    ///
    /// # 参数
    /// * `xml_content` - container.xml的文件内容
    ///
    /// # 返回值
    /// * `Result<Container, EpubError>` - 解析后的Container信息
    pub fn parse_xml(xml_content: &str) -> Result<Container> {
        let mut reader = Reader::from_str(xml_content);
        reader.config_mut().trim_text(true);
        reader.config_mut().expand_empty_elements = true;

        let mut rootfiles = Vec::new();
        let mut in_rootfiles = false;

        loop {
            match reader.read_event()? {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let local_name = e.local_name();
                    match local_name.as_ref() {
                        b"rootfiles" => {
                            in_rootfiles = true;
                        }
                        b"rootfile" if in_rootfiles => {
                            let mut full_path = String::new();
                            let mut media_type = String::new();

                            for attr_result in e.attributes() {
                                let attr = attr_result?;
                                match attr.key.local_name().as_ref() {
                                    b"full-path" => {
                                        full_path = attr.unescape_value()?.into_owned();
                                    }
                                    b"media-type" => {
                                        media_type = attr.unescape_value()?.into_owned();
                                    }
                                    _ => {}
                                }
                            }

                            if !full_path.is_empty() {
                                rootfiles.push(RootFile {
                                    full_path,
                                    media_type,
                                });
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) => {
                    if e.local_name().as_ref() == b"rootfiles" {
                        in_rootfiles = false;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Container { rootfiles })
    }

    /// 获取OPF根文件路径
    ///
    /// 只接受媒体类型为 `application/oebps-package+xml` 的rootfile。
    pub fn get_opf_path(&self) -> Option<&str> {
        self.rootfiles
            .iter()
            .find(|rootfile| rootfile.media_type == PACKAGE_MEDIA_TYPE)
            .map(|rootfile| rootfile.full_path.as_str())
    }
}

/// 在解压后的工作目录中定位OPF根文件
///
/// # 参数
/// * `root` - 包的根目录
///
/// # 返回值
/// * `Result<PathBuf>` - OPF文件的绝对路径
pub fn resolve_package_document(root: &Path) -> Result<PathBuf> {
    let container_path = root.join(CONTAINER_PATH);
    if !container_path.is_file() {
        return Err(EpubError::MissingContainer(container_path));
    }

    let content = fs::read_to_string(&container_path)?;
    let container = Container::parse_xml(content.trim_start_matches('\u{feff}'))?;

    let opf_path = container.get_opf_path().ok_or_else(|| {
        EpubError::MalformedContainer(format!(
            "没有媒体类型为{}的rootfile",
            PACKAGE_MEDIA_TYPE
        ))
    })?;

    Ok(root.join(opf_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_container_xml() {
        let container_xml = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
        <rootfile full-path="OEBPS/toc.ncx" media-type="application/x-dtbncx+xml"/>
    </rootfiles>
</container>"#;

        let container = Container::parse_xml(container_xml).unwrap();
        assert_eq!(container.rootfiles.len(), 2);
        assert_eq!(container.rootfiles[1].full_path, "OEBPS/toc.ncx");
        assert_eq!(container.get_opf_path(), Some("OEBPS/content.opf"));
    }

    #[test]
    fn test_parse_container_without_namespace() {
        let container_xml = r#"<container version="1.0">
    <rootfiles>
        <rootfile full-path="content.opf" media-type="application/oebps-package+xml"/>
    </rootfiles>
</container>"#;

        let container = Container::parse_xml(container_xml).unwrap();
        assert_eq!(container.get_opf_path(), Some("content.opf"));
    }

    #[test]
    fn test_rootfile_with_wrong_media_type_is_ignored() {
        let container = Container {
            rootfiles: vec![RootFile {
                full_path: "OEBPS/book.pdf".to_string(),
                media_type: "application/pdf".to_string(),
            }],
        };
        assert_eq!(container.get_opf_path(), None);
    }

    #[test]
    fn test_resolve_missing_container() {
        let dir = TempDir::new().unwrap();
        let result = resolve_package_document(dir.path());
        assert!(matches!(result, Err(EpubError::MissingContainer(_))));
    }

    #[test]
    fn test_resolve_malformed_container() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("META-INF")).unwrap();
        fs::write(
            dir.path().join(CONTAINER_PATH),
            r#"<container><rootfiles></rootfiles></container>"#,
        )
        .unwrap();

        let result = resolve_package_document(dir.path());
        assert!(matches!(result, Err(EpubError::MalformedContainer(_))));
    }

    #[test]
    fn test_resolve_package_document() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("META-INF")).unwrap();
        fs::write(
            dir.path().join(CONTAINER_PATH),
            r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
    </rootfiles>
</container>"#,
        )
        .unwrap();

        let opf_path = resolve_package_document(dir.path()).unwrap();
        assert_eq!(opf_path, dir.path().join("OEBPS/content.opf"));
    }
}
