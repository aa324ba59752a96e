use crate::core::cleaning::POSTCODE;
use crate::domain::model::{Dataset, Record};
use crate::utils::error::{EtlError, Result};
use calamine::{Data, Reader, Xlsx};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

const POSTCODE_WIDTH: usize = 5;

/// 郵遞區號對照表：postcode -> 一或多列（city, state, ...）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostcodeDirectory {
    /// 除 postcode 以外的欄位，已轉小寫
    pub columns: Vec<String>,
    entries: HashMap<String, Vec<HashMap<String, String>>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub unmatched: usize,
    pub output_records: usize,
}

impl PostcodeDirectory {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn lookup(&self, postcode: &str) -> &[HashMap<String, String>] {
        self.entries
            .get(postcode)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 依副檔名解析對照表檔案內容
    pub fn from_bytes(file_name: &str, bytes: &[u8]) -> Result<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let rows = match extension.as_str() {
            "csv" => read_delimited(bytes, b',')?,
            "tsv" => read_delimited(bytes, b'\t')?,
            "xlsx" => read_xlsx(bytes)?,
            other => {
                return Err(EtlError::InvalidConfigValueError {
                    field: "lookup_files".to_string(),
                    value: file_name.to_string(),
                    reason: format!("Unsupported postcode file type: '{}'", other),
                })
            }
        };

        Self::from_rows(file_name, rows)
    }

    /// 第一列為標題列，必須包含 `postcode`
    pub fn from_rows(source: &str, rows: Vec<Vec<String>>) -> Result<Self> {
        let mut rows = rows.into_iter();
        let headers: Vec<String> = rows
            .next()
            .unwrap_or_default()
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let key_index = headers
            .iter()
            .position(|h| h == POSTCODE)
            .ok_or_else(|| EtlError::ValidationError {
                message: format!("postcode file '{}' has no 'postcode' column", source),
            })?;

        let mut directory = PostcodeDirectory {
            columns: headers
                .iter()
                .filter(|h| h.as_str() != POSTCODE && !h.is_empty())
                .cloned()
                .collect(),
            entries: HashMap::new(),
        };

        for row in rows {
            let Some(key) = row.get(key_index).and_then(|k| normalize_postcode(k)) else {
                continue;
            };
            let values = headers
                .iter()
                .enumerate()
                .filter(|(i, h)| *i != key_index && !h.is_empty())
                .map(|(i, h)| (h.clone(), row.get(i).map(|v| v.trim().to_string()).unwrap_or_default()))
                .collect();
            directory.entries.entry(key).or_default().push(values);
        }

        tracing::debug!(
            "Loaded {} postcode rows from '{}' (columns: {:?})",
            directory.len(),
            source,
            directory.columns
        );
        Ok(directory)
    }

    /// 合併多個對照表
    pub fn extend(&mut self, other: PostcodeDirectory) {
        for column in other.columns {
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        for (key, rows) in other.entries {
            self.entries.entry(key).or_default().extend(rows);
        }
    }

    /// 以 postcode 做 left join。
    ///
    /// 找不到對應時保留原列一次；對應到 k 列時輸出 k 列。對照表欄位依
    /// `column_mapping` 改名，改名後與既有欄位同名者不匯入（以原資料為準）。
    pub fn merge_into(
        &self,
        dataset: &mut Dataset,
        column_mapping: &HashMap<String, String>,
    ) -> MergeSummary {
        let imported: Vec<(String, String)> = self
            .columns
            .iter()
            .map(|c| (c.clone(), column_mapping.get(c).cloned().unwrap_or_else(|| c.clone())))
            .filter(|(_, target)| !dataset.has_column(target))
            .collect();

        if !dataset.has_column(POSTCODE) {
            tracing::warn!("⚠️ No '{}' column found, district lookup skipped", POSTCODE);
        }

        let mut summary = MergeSummary::default();
        let mut merged = Vec::with_capacity(dataset.records.len());

        for mut record in std::mem::take(&mut dataset.records) {
            let key = record.get(POSTCODE).and_then(postcode_text);
            if let Some(key) = &key {
                record
                    .data
                    .insert(POSTCODE.to_string(), Value::String(key.clone()));
            }

            let matches = key.as_deref().map(|k| self.lookup(k)).unwrap_or(&[]);
            if matches.is_empty() {
                summary.unmatched += 1;
                merged.push(record);
                continue;
            }

            for row in matches {
                let mut joined: Record = record.clone();
                for (source, target) in &imported {
                    let value = row
                        .get(source)
                        .filter(|v| !v.is_empty())
                        .map(|v| Value::String(v.clone()))
                        .unwrap_or(Value::Null);
                    joined.data.insert(target.clone(), value);
                }
                merged.push(joined);
            }
        }

        for (_, target) in &imported {
            dataset.ensure_column(target);
        }
        dataset.records = merged;
        summary.output_records = dataset.records.len();
        summary
    }
}

fn postcode_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => normalize_postcode(s),
        Value::Number(n) => normalize_postcode(&n.to_string()),
        _ => None,
    }
}

/// 去除空白與 `.0`，不足五位的純數字左補零
pub fn normalize_postcode(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = match trimmed.strip_suffix(".0") {
        Some(integral) if !integral.is_empty() && integral.chars().all(|c| c.is_ascii_digit()) => {
            integral
        }
        _ => trimmed,
    };

    if trimmed.is_empty() {
        return None;
    }

    if trimmed.len() < POSTCODE_WIDTH && trimmed.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{:0>width$}", trimmed, width = POSTCODE_WIDTH))
    } else {
        Some(trimmed.to_string())
    }
}

fn read_delimited(bytes: &[u8], delimiter: u8) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }

    // 去掉 UTF-8 BOM，避免標題比對失敗
    if let Some(first) = rows.first_mut().and_then(|row| row.first_mut()) {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.to_string();
        }
    }
    Ok(rows)
}

fn read_xlsx(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EtlError::ValidationError {
            message: "postcode workbook has no worksheet".to_string(),
        })??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const POSTCODES_CSV: &str = "\u{feff}Postcode,City,State\n\
        43000,Kajang,Selangor\n\
        01000,Kangar,Perlis\n\
        50000,Kuala Lumpur,WP Kuala Lumpur\n\
        50000,Bandar Kuala Lumpur,WP Kuala Lumpur\n";

    fn directory() -> PostcodeDirectory {
        PostcodeDirectory::from_bytes("postcodes.csv", POSTCODES_CSV.as_bytes()).unwrap()
    }

    fn district_mapping() -> HashMap<String, String> {
        HashMap::from([("city".to_string(), "district".to_string())])
    }

    #[test]
    fn test_normalize_postcode() {
        assert_eq!(normalize_postcode(" 43000 "), Some("43000".to_string()));
        assert_eq!(normalize_postcode("1000"), Some("01000".to_string()));
        assert_eq!(normalize_postcode("1000.0"), Some("01000".to_string()));
        assert_eq!(normalize_postcode("SW1A"), Some("SW1A".to_string()));
        assert_eq!(normalize_postcode("   "), None);
    }

    #[test]
    fn test_csv_headers_are_normalized() {
        let directory = directory();
        assert_eq!(directory.columns, vec!["city", "state"]);
        assert_eq!(directory.len(), 4);
        assert_eq!(directory.lookup("01000")[0]["city"], "Kangar");
        assert_eq!(directory.lookup("50000").len(), 2);
    }

    #[test]
    fn test_missing_postcode_header_is_rejected() {
        let result = PostcodeDirectory::from_bytes("bad.csv", b"zip,city\n43000,Kajang\n");
        assert!(matches!(result, Err(EtlError::ValidationError { .. })));
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        assert!(PostcodeDirectory::from_bytes("postcodes.txt", b"postcode\n").is_err());
    }

    #[test]
    fn test_left_join_adds_district_and_keeps_record_state() {
        let mut dataset = Dataset::from_json_value(json!([
            {"name": "A", "state": "SELANGOR (form)", "postcode": 43000},
            {"name": "B", "state": "Perlis", "postcode": " 1000 "},
            {"name": "C", "state": "Johor", "postcode": "81000"},
            {"name": "D", "state": "Johor"}
        ]))
        .unwrap();

        let summary = directory().merge_into(&mut dataset, &district_mapping());

        assert_eq!(summary.unmatched, 2);
        assert_eq!(summary.output_records, 4);
        assert_eq!(dataset.columns, vec!["name", "state", "postcode", "district"]);

        let a = &dataset.records[0];
        assert_eq!(a.data["postcode"], json!("43000"));
        assert_eq!(a.data["district"], json!("Kajang"));
        assert_eq!(a.data["state"], json!("SELANGOR (form)"));

        assert_eq!(dataset.records[1].data["postcode"], json!("01000"));
        assert_eq!(dataset.records[1].data["district"], json!("Kangar"));
        assert!(dataset.records[2].get("district").is_none());
        assert!(dataset.records[3].get("postcode").is_none());
    }

    #[test]
    fn test_duplicate_lookup_rows_duplicate_the_record() {
        let mut dataset =
            Dataset::from_json_value(json!([{"name": "A", "postcode": "50000"}])).unwrap();

        let summary = directory().merge_into(&mut dataset, &district_mapping());

        assert_eq!(summary.output_records, 2);
        let districts: Vec<&Value> = dataset.records.iter().map(|r| &r.data["district"]).collect();
        assert_eq!(
            districts,
            vec![&json!("Kuala Lumpur"), &json!("Bandar Kuala Lumpur")]
        );
        assert_eq!(dataset.records[0].data["state"], json!("WP Kuala Lumpur"));
    }

    #[test]
    fn test_extend_concatenates_directories() {
        let mut first = directory();
        let second = PostcodeDirectory::from_bytes(
            "extra.tsv",
            b"postcode\tcity\tregion\n81000\tKulai\tSouth\n",
        )
        .unwrap();
        first.extend(second);

        assert_eq!(first.columns, vec!["city", "state", "region"]);
        assert_eq!(first.lookup("81000")[0]["city"], "Kulai");
    }

    #[test]
    fn test_xlsx_postcode_file() {
        let rows = vec![
            vec![json!("postcode"), json!("city"), json!("state")],
            vec![json!(43000), json!("Kajang"), json!("Selangor")],
            vec![json!(1000), json!("Kangar"), json!("Perlis")],
        ];
        let bytes = crate::core::xlsx::write_workbook("Sheet1", &rows).unwrap();

        let directory = PostcodeDirectory::from_bytes("Malaysia-Postcodes.xlsx", &bytes).unwrap();

        assert_eq!(directory.columns, vec!["city", "state"]);
        assert_eq!(directory.lookup("43000")[0]["state"], "Selangor");
        assert_eq!(directory.lookup("01000")[0]["city"], "Kangar");
    }
}
