//! Spreadsheet snapshots of a run.
//!
//! Workbooks are written as a bare Office Open XML package: one worksheet,
//! inline strings only, no styles.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::dates::format_date;
use crate::error::Result;
use crate::types::HandoverRow;

pub const SNAPSHOT_COLUMNS: [&str; 12] = [
    "IPRP Number",
    "Portfolio ID",
    "Portfolio Name",
    "Name",
    "Handing Over to",
    "Start Date",
    "End Date",
    "Email",
    "Email (Person receiving the handover)",
    "Handover files Sharepoint link",
    "Index Status",
    "Is it a part of Index Family",
];

pub const SNAPSHOT_PREFIX: &str = "Updated_Handover_Info";
pub const CURRENTLY_WORKING_PREFIX: &str = "Currently_working_Info";

const SHEET_NAME: &str = "Handovers";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// `<prefix>_<YYYY_MM_DD_HH_MM_SS>.xlsx`
pub fn snapshot_file_name(prefix: &str, timestamp: NaiveDateTime) -> String {
    format!("{prefix}_{}.xlsx", timestamp.format("%Y_%m_%d_%H_%M_%S"))
}

pub fn snapshot_path(directory: &Path, prefix: &str, timestamp: NaiveDateTime) -> PathBuf {
    directory.join(snapshot_file_name(prefix, timestamp))
}

/// Writes `rows` to a new workbook at `path` in the published column order.
pub fn export(rows: &[HandoverRow], path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_workbook(&mut writer, rows)?;
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "Excel file has been generated");
    Ok(())
}

pub fn write_workbook<W: Write + Seek>(writer: W, rows: &[HandoverRow]) -> Result<()> {
    let mut zip = ZipWriter::new(writer);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES.as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS.as_bytes())?;

    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook_xml().as_bytes())?;

    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(WORKBOOK_RELS.as_bytes())?;

    zip.start_file("xl/worksheets/sheet1.xml", options)?;
    zip.write_all(sheet_xml(rows).as_bytes())?;

    zip.finish()?;
    Ok(())
}

/// Cell values of one row, in [`SNAPSHOT_COLUMNS`] order.
pub fn row_values(row: &HandoverRow) -> [String; 12] {
    let d = &row.details;
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    [
        text(&d.iprp_number),
        row.portfolio_id(),
        text(&row.portfolio_name),
        text(&d.name),
        text(&d.handing_over_to),
        format_date(d.start_date).unwrap_or_default(),
        format_date(d.end_date).unwrap_or_default(),
        text(&d.email),
        text(&d.email_receiver),
        text(&d.sharepoint_link),
        text(&d.index_status),
        text(&d.index_family),
    ]
}

fn workbook_xml() -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\n",
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            r#"<sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
        ),
        SHEET_NAME
    )
}

fn sheet_xml(rows: &[HandoverRow]) -> String {
    let mut xml = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        "\n",
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#
    ));

    push_row(&mut xml, 1, SNAPSHOT_COLUMNS.iter().copied());
    for (index, row) in rows.iter().enumerate() {
        let values = row_values(row);
        push_row(&mut xml, index + 2, values.iter().map(String::as_str));
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

fn push_row<'a>(xml: &mut String, number: usize, cells: impl Iterator<Item = &'a str>) {
    xml.push_str(&format!(r#"<row r="{number}">"#));
    for (column, value) in cells.enumerate() {
        if value.is_empty() {
            continue;
        }
        xml.push_str(&format!(
            r#"<c r="{}{number}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
            column_letters(column),
            escape_xml(value)
        ));
    }
    xml.push_str("</row>");
}

/// 0 → "A", 25 → "Z", 26 → "AA".
fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Escapes markup characters and drops control characters XML 1.0 forbids.
fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\t' | '\n' | '\r' => escaped.push(ch),
            c if c.is_control() => {}
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_roll_over() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(11), "L");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn markup_is_escaped_and_controls_dropped() {
        assert_eq!(escape_xml("R&D <Fund> \"A\""), "R&amp;D &lt;Fund&gt; &quot;A&quot;");
        assert_eq!(escape_xml("a\u{0001}b"), "ab");
    }

    #[test]
    fn file_names_carry_the_timestamp() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 7, 22)
            .unwrap()
            .and_hms_opt(17, 57, 50)
            .unwrap();
        assert_eq!(
            snapshot_file_name(SNAPSHOT_PREFIX, ts),
            "Updated_Handover_Info_2024_07_22_17_57_50.xlsx"
        );
    }
}
