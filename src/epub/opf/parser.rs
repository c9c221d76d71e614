//! OPF解析器模块
//!
//! 把OPF根文件解析为清单与脊柱，作为整个重建过程中唯一的包模型。

use crate::epub::config::RebuildConfig;
use crate::epub::error::{EpubError, Result};
use crate::epub::opf::{
    manifest::{EntryRole, ManifestItem},
    spine::SpineItem,
};
use percent_encoding::percent_decode_str;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// OPF文件解析结果
#[derive(Debug, Clone)]
pub struct Opf {
    /// OPF文件路径
    pub path: PathBuf,
    /// OPF文件所在目录，清单中的href都相对于此目录
    pub dir: PathBuf,
    /// 清单项(文件列表)
    pub manifest: HashMap<String, ManifestItem>,
    /// 清单项在文档中的顺序
    pub manifest_order: Vec<String>,
    /// 脊柱(阅读顺序)
    pub spine: Vec<SpineItem>,
    /// 脊柱的目录引用
    pub spine_toc: Option<String>,
}

impl Opf {
    /// 读取并解析OPF文件
    ///
    /// # 参数
    /// * `path` - OPF文件的绝对路径
    ///
    /// # 返回值
    /// * `Result<Opf>` - 包模型
    pub fn load(path: &Path) -> Result<Opf> {
        let content = fs::read_to_string(path)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut opf = Self::parse_xml(content.trim_start_matches('\u{feff}'), &dir)?;
        opf.path = path.to_path_buf();
        Ok(opf)
    }

    /// 解析OPF文件内容
    ///
    /// 引用了不存在清单项的脊柱项会被直接丢弃。
    ///
    /// # 参数
    /// * `xml_content` - OPF文件的XML内容
    /// * `dir` - OPF文件所在目录
    ///
    /// # 返回值
    /// * `Result<Opf, EpubError>` - 解析后的OPF信息
    pub fn parse_xml(xml_content: &str, dir: &Path) -> Result<Opf> {
        let mut reader = Reader::from_str(xml_content);
        reader.config_mut().trim_text(true);

        let mut manifest = HashMap::new();
        let mut manifest_order = Vec::new();
        let mut spine = Vec::new();
        let mut spine_toc = None;

        let mut has_manifest = false;
        let mut has_spine = false;
        let mut current_section = "";

        loop {
            let event = reader.read_event()?;
            let opens_section = matches!(event, Event::Start(_));
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    match e.local_name().as_ref() {
                        b"manifest" => {
                            has_manifest = true;
                            if opens_section {
                                current_section = "manifest";
                            }
                        }
                        b"spine" => {
                            has_spine = true;
                            if opens_section {
                                current_section = "spine";
                            }
                            spine_toc = Self::parse_spine_toc(e)?;
                        }
                        b"item" if current_section == "manifest" => {
                            if let Some(item) = Self::parse_manifest_item(e, dir)? {
                                if !manifest.contains_key(&item.id) {
                                    manifest_order.push(item.id.clone());
                                }
                                manifest.insert(item.id.clone(), item);
                            }
                        }
                        b"itemref" if current_section == "spine" => {
                            if let Some(spine_item) = Self::parse_spine_item(e)? {
                                spine.push(spine_item);
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) => {
                    if matches!(e.local_name().as_ref(), b"manifest" | b"spine") {
                        current_section = "";
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !has_manifest {
            return Err(EpubError::MissingManifest);
        }
        if !has_spine {
            return Err(EpubError::MissingSpine);
        }

        let total = spine.len();
        spine.retain(|item: &SpineItem| manifest.contains_key(&item.idref));
        if spine.len() < total {
            debug!("丢弃了{}个在清单中不存在的脊柱项", total - spine.len());
        }

        Ok(Opf {
            path: PathBuf::new(),
            dir: dir.to_path_buf(),
            manifest,
            manifest_order,
            spine,
            spine_toc,
        })
    }

    /// 解析spine元素的toc属性
    fn parse_spine_toc(e: &BytesStart) -> Result<Option<String>> {
        for attr_result in e.attributes() {
            let attr = attr_result?;
            if attr.key.local_name().as_ref() == b"toc" {
                return Ok(Some(attr.unescape_value()?.into_owned()));
            }
        }
        Ok(None)
    }

    /// 解析清单项，缺少必要属性时返回None
    fn parse_manifest_item(e: &BytesStart, dir: &Path) -> Result<Option<ManifestItem>> {
        let mut id = String::new();
        let mut href = String::new();
        let mut media_type = String::new();
        let mut properties = None;

        for attr_result in e.attributes() {
            let attr = attr_result?;
            match attr.key.local_name().as_ref() {
                b"id" => id = attr.unescape_value()?.into_owned(),
                b"href" => href = attr.unescape_value()?.into_owned(),
                b"media-type" => media_type = attr.unescape_value()?.into_owned(),
                b"properties" => properties = Some(attr.unescape_value()?.into_owned()),
                _ => {}
            }
        }

        if id.is_empty() || href.is_empty() {
            return Ok(None);
        }

        // href是URL编码的，文件路径需要解码
        let path = dir.join(percent_decode_str(&href).decode_utf8_lossy().as_ref());
        let mut item = ManifestItem::new(id, href, media_type, path);
        item.properties = properties;
        Ok(Some(item))
    }

    /// 解析脊柱项
    fn parse_spine_item(e: &BytesStart) -> Result<Option<SpineItem>> {
        let mut idref = String::new();
        let mut linear = true;

        for attr_result in e.attributes() {
            let attr = attr_result?;
            match attr.key.local_name().as_ref() {
                b"idref" => idref = attr.unescape_value()?.into_owned(),
                b"linear" => linear = attr.value.as_ref() != b"no",
                _ => {}
            }
        }

        if idref.is_empty() {
            return Ok(None);
        }
        Ok(Some(SpineItem::with_linear(idref, linear)))
    }

    /// 按文档顺序遍历清单项
    pub fn items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.manifest_order
            .iter()
            .filter_map(|id| self.manifest.get(id))
    }

    /// 按阅读顺序遍历脊柱引用的清单项
    pub fn spine_items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.spine
            .iter()
            .filter_map(|spine_item| self.manifest.get(&spine_item.idref))
    }

    /// 根据ID获取清单项
    pub fn get_manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.get(id)
    }

    /// 按阅读顺序获取需要拆分的正文文档
    pub fn content_documents(&self, config: &RebuildConfig) -> Vec<&ManifestItem> {
        self.spine_items()
            .filter(|item| item.is_xhtml())
            .filter(|item| {
                matches!(item.role(config), EntryRole::Content | EntryRole::Chapter)
            })
            .collect()
    }

    /// 获取将被章节取代的旧正文文档
    ///
    /// 只包含脊柱引用的正文文档，脊柱之外的XHTML(如注释页)原样保留。
    pub fn old_content_items(&self, config: &RebuildConfig) -> Vec<&ManifestItem> {
        let mut seen = HashSet::new();
        self.spine_items()
            .filter(|item| item.role(config) == EntryRole::Content)
            .filter(|item| seen.insert(item.id.as_str()))
            .collect()
    }

    /// 获取封面页，优先取脊柱中的
    pub fn cover_item(&self, config: &RebuildConfig) -> Option<&ManifestItem> {
        self.spine_items()
            .chain(self.items())
            .find(|item| item.role(config) == EntryRole::Cover)
    }

    /// 获取导航文档，优先取带nav属性的清单项
    pub fn nav_item(&self, config: &RebuildConfig) -> Option<&ManifestItem> {
        self.items().find(|item| item.is_nav()).or_else(|| {
            self.items()
                .find(|item| item.is_xhtml() && item.role(config) == EntryRole::Navigation)
        })
    }

    /// 获取NCX文件，优先取spine的toc属性所引用的
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.spine_toc
            .as_deref()
            .and_then(|id| self.manifest.get(id))
            .filter(|item| item.is_ncx())
            .or_else(|| self.items().find(|item| item.is_ncx()))
    }

    /// 获取第一个样式表
    pub fn stylesheet_item(&self) -> Option<&ManifestItem> {
        self.items().find(|item| item.is_css())
    }

    /// 移除清单项
    pub fn remove_item(&mut self, id: &str) -> Option<ManifestItem> {
        let removed = self.manifest.remove(id);
        if removed.is_some() {
            self.manifest_order.retain(|existing| existing != id);
        }
        removed
    }

    /// 插入或更新清单项，已存在的ID保持原有位置
    pub fn upsert_item(&mut self, item: ManifestItem) {
        if !self.manifest.contains_key(&item.id) {
            self.manifest_order.push(item.id.clone());
        }
        self.manifest.insert(item.id.clone(), item);
    }

    /// 清单中href对应的绝对路径
    pub fn resolve_href(&self, href: &str) -> PathBuf {
        self.dir.join(percent_decode_str(href).decode_utf8_lossy().as_ref())
    }
}
