use crate::core::xlsx;
use crate::domain::model::Dataset;
use crate::domain::settings::{OutputFormat, OutputSettings};
use crate::utils::error::Result;
use serde_json::Value;
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

pub const REPORT_FILENAME: &str = "processing_report.json";

/// 一個要寫出的檔案
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// 將多個檔案打包成 ZIP
pub fn build_zip(entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, data) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(data)?;
    }

    // 完成並取回底層 Vec<u8>
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// 文字格式（CSV/TSV）的儲存格內容
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        nested => nested.to_string(),
    }
}

fn row_values(dataset: &Dataset) -> impl Iterator<Item = Vec<&Value>> + '_ {
    dataset.records.iter().map(|record| {
        dataset
            .columns
            .iter()
            .map(|column| record.data.get(column).unwrap_or(&Value::Null))
            .collect()
    })
}

pub fn to_delimited(dataset: &Dataset, delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(&dataset.columns)?;
    for row in row_values(dataset) {
        writer.write_record(row.into_iter().map(cell_text))?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}

pub fn to_json(dataset: &Dataset) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&dataset.to_json_rows())?)
}

pub fn to_xlsx(dataset: &Dataset, sheet_name: &str) -> Result<Vec<u8>> {
    let mut rows = Vec::with_capacity(dataset.len() + 1);
    rows.push(
        dataset
            .columns
            .iter()
            .map(|c| Value::String(c.clone()))
            .collect::<Vec<_>>(),
    );
    rows.extend(row_values(dataset).map(|row| row.into_iter().cloned().collect()));
    xlsx::write_workbook(sheet_name, &rows)
}

/// 依設定產生所有輸出檔案
pub fn render(dataset: &Dataset, settings: &OutputSettings) -> Result<Vec<Artifact>> {
    let mut artifacts = Vec::with_capacity(settings.formats.len());
    for format in &settings.formats {
        let data = match format {
            OutputFormat::Xlsx => to_xlsx(dataset, &settings.sheet_name)?,
            OutputFormat::Csv => to_delimited(dataset, b',')?,
            OutputFormat::Tsv => to_delimited(dataset, b'\t')?,
            OutputFormat::Json => to_json(dataset)?,
        };
        artifacts.push(Artifact {
            file_name: format!("{}.{}", settings.base_name, format.extension()),
            data,
        });
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Read;

    fn sample() -> Dataset {
        let mut dataset = Dataset::from_json_value(json!([
            {"program": "INSAN", "name": "SITI, ALI", "age": 39, "lat": 2.99, "verified": true},
            {"program": "INTAN", "name": "AHMAD", "age": "IC ERROR"}
        ]))
        .unwrap();
        dataset.reorder_columns(&["name".into()]);
        dataset
    }

    #[test]
    fn test_csv_follows_column_order_and_quotes() {
        let csv = String::from_utf8(to_delimited(&sample(), b',').unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "name,program,age,lat,verified");
        assert_eq!(lines[1], "\"SITI, ALI\",INSAN,39,2.99,TRUE");
        assert_eq!(lines[2], "AHMAD,INTAN,IC ERROR,,");
    }

    #[test]
    fn test_tsv_uses_tabs() {
        let tsv = String::from_utf8(to_delimited(&sample(), b'\t').unwrap()).unwrap();
        assert!(tsv.starts_with("name\tprogram\tage\tlat\tverified\n"));
    }

    #[test]
    fn test_json_rows_include_nulls_for_missing_columns() {
        let rows: Value = serde_json::from_slice(&to_json(&sample()).unwrap()).unwrap();
        assert_eq!(rows[1]["lat"], Value::Null);
        assert_eq!(rows[0]["age"], json!(39));
    }

    #[test]
    fn test_render_names_files_after_base_name() {
        let settings = OutputSettings {
            formats: vec![OutputFormat::Xlsx, OutputFormat::Csv],
            ..OutputSettings::default()
        };
        let artifacts = render(&sample(), &settings).unwrap();
        let names: Vec<&str> = artifacts.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "combined_data_with_districts.xlsx",
                "combined_data_with_districts.csv"
            ]
        );
    }

    #[test]
    fn test_build_zip_contents() {
        let bytes = build_zip(&[("a.csv", &b"x,y\n1,2"[..]), ("b.json", &b"[]"[..])]).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut content = String::new();
        archive
            .by_name("a.csv")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "x,y\n1,2");
    }
}
