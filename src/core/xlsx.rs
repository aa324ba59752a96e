//! 最小的 XLSX 寫入器：單一工作表、inline 字串與數值儲存格。

use crate::core::export::build_zip;
use crate::utils::error::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;
use std::borrow::Cow;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const CT_PREFIX: &str = "application/vnd.openxmlformats-";

type XmlWriter = Writer<Vec<u8>>;

/// 將列資料寫成只有一個工作表的 XLSX 檔
pub fn write_workbook(sheet_name: &str, rows: &[Vec<Value>]) -> Result<Vec<u8>> {
    let content_types = content_types_xml()?;
    let package_rels = relationships_xml(&[("rId1", "officeDocument", "xl/workbook.xml")])?;
    let workbook = workbook_xml(&sanitize_sheet_name(sheet_name))?;
    let workbook_rels = relationships_xml(&[
        ("rId1", "worksheet", "worksheets/sheet1.xml"),
        ("rId2", "styles", "styles.xml"),
    ])?;
    let styles = styles_xml()?;
    let sheet = worksheet_xml(rows)?;

    build_zip(&[
        ("[Content_Types].xml", content_types.as_slice()),
        ("_rels/.rels", package_rels.as_slice()),
        ("xl/workbook.xml", workbook.as_slice()),
        ("xl/_rels/workbook.xml.rels", workbook_rels.as_slice()),
        ("xl/styles.xml", styles.as_slice()),
        ("xl/worksheets/sheet1.xml", sheet.as_slice()),
    ])
}

fn new_part() -> Result<XmlWriter> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    Ok(writer)
}

fn open(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    writer.write_event(Event::Start(
        BytesStart::new(name).with_attributes(attrs.iter().copied()),
    ))?;
    Ok(())
}

fn close(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn leaf(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    writer.write_event(Event::Empty(
        BytesStart::new(name).with_attributes(attrs.iter().copied()),
    ))?;
    Ok(())
}

fn text_element(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
    open(writer, name, attrs)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    close(writer, name)
}

fn content_types_xml() -> Result<Vec<u8>> {
    let mut w = new_part()?;
    open(&mut w, "Types", &[("xmlns", CONTENT_TYPES_NS)])?;
    leaf(
        &mut w,
        "Default",
        &[
            ("Extension", "rels"),
            ("ContentType", format!("{}package.relationships+xml", CT_PREFIX).as_str()),
        ],
    )?;
    leaf(&mut w, "Default", &[("Extension", "xml"), ("ContentType", "application/xml")])?;

    let overrides = [
        ("/xl/workbook.xml", "spreadsheetml.sheet.main+xml"),
        ("/xl/worksheets/sheet1.xml", "spreadsheetml.worksheet+xml"),
        ("/xl/styles.xml", "spreadsheetml.styles+xml"),
    ];
    for (part, kind) in overrides {
        let content_type = format!("{}officedocument.{}", CT_PREFIX, kind);
        leaf(&mut w, "Override", &[("PartName", part), ("ContentType", content_type.as_str())])?;
    }

    close(&mut w, "Types")?;
    Ok(w.into_inner())
}

/// (Id, 關係類型, Target)
fn relationships_xml(relations: &[(&str, &str, &str)]) -> Result<Vec<u8>> {
    let mut w = new_part()?;
    open(&mut w, "Relationships", &[("xmlns", PKG_REL_NS)])?;
    for &(id, kind, target) in relations {
        let rel_type = format!("{}/{}", REL_NS, kind);
        leaf(
            &mut w,
            "Relationship",
            &[("Id", id), ("Type", rel_type.as_str()), ("Target", target)],
        )?;
    }
    close(&mut w, "Relationships")?;
    Ok(w.into_inner())
}

fn workbook_xml(sheet_name: &str) -> Result<Vec<u8>> {
    let mut w = new_part()?;
    open(&mut w, "workbook", &[("xmlns", MAIN_NS), ("xmlns:r", REL_NS)])?;
    open(&mut w, "sheets", &[])?;
    leaf(
        &mut w,
        "sheet",
        &[("name", sheet_name), ("sheetId", "1"), ("r:id", "rId1")],
    )?;
    close(&mut w, "sheets")?;
    close(&mut w, "workbook")?;
    Ok(w.into_inner())
}

fn styles_xml() -> Result<Vec<u8>> {
    let mut w = new_part()?;
    open(&mut w, "styleSheet", &[("xmlns", MAIN_NS)])?;

    open(&mut w, "fonts", &[("count", "1")])?;
    open(&mut w, "font", &[])?;
    leaf(&mut w, "sz", &[("val", "11")])?;
    leaf(&mut w, "name", &[("val", "Calibri")])?;
    close(&mut w, "font")?;
    close(&mut w, "fonts")?;

    open(&mut w, "fills", &[("count", "2")])?;
    for pattern in ["none", "gray125"] {
        open(&mut w, "fill", &[])?;
        leaf(&mut w, "patternFill", &[("patternType", pattern)])?;
        close(&mut w, "fill")?;
    }
    close(&mut w, "fills")?;

    open(&mut w, "borders", &[("count", "1")])?;
    open(&mut w, "border", &[])?;
    for side in ["left", "right", "top", "bottom", "diagonal"] {
        leaf(&mut w, side, &[])?;
    }
    close(&mut w, "border")?;
    close(&mut w, "borders")?;

    let xf = [("numFmtId", "0"), ("fontId", "0"), ("fillId", "0"), ("borderId", "0")];
    open(&mut w, "cellStyleXfs", &[("count", "1")])?;
    leaf(&mut w, "xf", &xf)?;
    close(&mut w, "cellStyleXfs")?;
    open(&mut w, "cellXfs", &[("count", "1")])?;
    leaf(&mut w, "xf", &[xf[0], xf[1], xf[2], xf[3], ("xfId", "0")])?;
    close(&mut w, "cellXfs")?;

    close(&mut w, "styleSheet")?;
    Ok(w.into_inner())
}

fn worksheet_xml(rows: &[Vec<Value>]) -> Result<Vec<u8>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let dimension = if rows.is_empty() || width == 0 {
        "A1".to_string()
    } else {
        format!("A1:{}{}", column_name(width - 1), rows.len())
    };

    let mut w = new_part()?;
    open(&mut w, "worksheet", &[("xmlns", MAIN_NS)])?;
    leaf(&mut w, "dimension", &[("ref", dimension.as_str())])?;
    open(&mut w, "sheetData", &[])?;

    for (row_index, row) in rows.iter().enumerate() {
        let row_number = (row_index + 1).to_string();
        open(&mut w, "row", &[("r", row_number.as_str())])?;
        for (col_index, value) in row.iter().enumerate() {
            let reference = format!("{}{}", column_name(col_index), row_number);
            match value {
                Value::Null => {}
                Value::Number(n) => {
                    open(&mut w, "c", &[("r", reference.as_str())])?;
                    text_element(&mut w, "v", &[], &n.to_string())?;
                    close(&mut w, "c")?;
                }
                Value::Bool(b) => {
                    open(&mut w, "c", &[("r", reference.as_str()), ("t", "b")])?;
                    text_element(&mut w, "v", &[], if *b { "1" } else { "0" })?;
                    close(&mut w, "c")?;
                }
                Value::String(s) => inline_string(&mut w, &reference, s)?,
                nested => inline_string(&mut w, &reference, &nested.to_string())?,
            }
        }
        close(&mut w, "row")?;
    }

    close(&mut w, "sheetData")?;
    close(&mut w, "worksheet")?;
    Ok(w.into_inner())
}

fn inline_string(w: &mut XmlWriter, reference: &str, text: &str) -> Result<()> {
    open(w, "c", &[("r", reference), ("t", "inlineStr")])?;
    open(w, "is", &[])?;
    text_element(w, "t", &[("xml:space", "preserve")], &strip_control_chars(text))?;
    close(w, "is")?;
    close(w, "c")
}

/// 0 -> A, 25 -> Z, 26 -> AA
pub fn column_name(index: usize) -> String {
    let mut name = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}

/// 移除 XML 1.0 不允許的控制字元
fn strip_control_chars(text: &str) -> Cow<'_, str> {
    let invalid = |c: char| {
        ((c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r')) || c == '\u{fffe}' || c == '\u{ffff}'
    };
    if text.chars().any(invalid) {
        Cow::Owned(text.chars().filter(|c| !invalid(*c)).collect())
    } else {
        Cow::Borrowed(text)
    }
}

/// Excel 工作表名稱最多 31 字元且不能含 `[]:*?/\`
fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    if cleaned.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}
