//! NCX解析器模块
//!
//! 读取NCX文件的导航地图，用于核对重建后的目录。嵌套的navPoint按playOrder平铺。

use crate::epub::error::Result;
use crate::epub::ncx::{NavContent, NavLabel, NavMap, NavPoint};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// NCX文件解析结果
#[derive(Debug, Clone)]
pub struct Ncx {
    /// 导航地图
    pub nav_map: NavMap,
}

impl Ncx {
    /// 解析NCX文件内容
    ///
    /// # 参数
    /// * `xml_content` - NCX文件的XML内容
    ///
    /// # 返回值
    /// * `Result<Ncx>` - 解析后的NCX信息
    pub fn parse_xml(xml_content: &str) -> Result<Ncx> {
        let mut reader = Reader::from_str(xml_content.trim_start_matches('\u{feff}'));
        reader.config_mut().trim_text(true);
        reader.config_mut().expand_empty_elements = true;

        let mut nav_map = NavMap::new();

        let mut buf = Vec::new();
        let mut in_nav_map = false;
        let mut in_nav_label = false;
        let mut text_content = String::new();
        let mut nav_point_stack: Vec<NavPoint> = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) => {
                    match e.local_name().as_ref() {
                        b"navMap" => in_nav_map = true,
                        b"navPoint" if in_nav_map => {
                            let id = attribute(e, b"id")?.unwrap_or_default();
                            let play_order = attribute(e, b"playOrder")?
                                .and_then(|value| value.trim().parse().ok())
                                .unwrap_or(0);
                            nav_point_stack.push(NavPoint::new(
                                id,
                                play_order,
                                NavLabel::new(String::new()),
                                NavContent::new(String::new()),
                            ));
                        }
                        b"navLabel" => in_nav_label = true,
                        b"content" if in_nav_map => {
                            if let (Some(point), Some(src)) =
                                (nav_point_stack.last_mut(), attribute(e, b"src")?)
                            {
                                point.content = NavContent::new(src);
                            }
                        }
                        _ => {}
                    }
                    text_content.clear();
                }
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"text" if in_nav_label => {
                        if let Some(point) = nav_point_stack.last_mut() {
                            point.nav_label = NavLabel::new(text_content.trim().to_string());
                        }
                    }
                    b"navLabel" => in_nav_label = false,
                    b"navMap" => in_nav_map = false,
                    b"navPoint" if in_nav_map => {
                        if let Some(point) = nav_point_stack.pop() {
                            nav_map.add_nav_point(point);
                        }
                    }
                    _ => {}
                },
                Event::Text(e) => {
                    text_content.push_str(&e.unescape()?);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        nav_map.sort_by_play_order();

        Ok(Ncx { nav_map })
    }

    /// 按播放顺序返回所有导航点的src
    pub fn get_chapter_paths(&self) -> Vec<String> {
        self.nav_map
            .nav_points
            .iter()
            .map(|point| point.content.src.clone())
            .collect()
    }
}

fn attribute(e: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
