use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, Value>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.data.get(column).and_then(Value::as_str)
    }
}

/// 有欄位順序的資料表：`columns` 記錄輸出順序，每筆 `Record` 以欄名取值。
///
/// 所有記錄的鍵都會出現在 `columns` 中；記錄缺少的欄位視為 null。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Self {
        Self { columns, records }
    }

    /// 解析上傳的 JSON 位元組
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| EtlError::InvalidInput {
            message: format!("Failed to decode JSON ({})", e),
        })?;
        Self::from_json_value(value)
    }

    /// 將 JSON 轉為資料表：陣列的每個物件一列，單一物件視為一列，巢狀物件攤平成 `a.b` 欄名
    pub fn from_json_value(value: Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items,
            obj @ Value::Object(_) => vec![obj],
            other => {
                return Err(EtlError::InvalidInput {
                    message: format!(
                        "expected an array of records or a single record object, found {}",
                        json_type_name(&other)
                    ),
                })
            }
        };

        let mut dataset = Dataset::default();
        let mut seen = HashSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let obj = match item {
                Value::Object(obj) => obj,
                other => {
                    return Err(EtlError::InvalidInput {
                        message: format!(
                            "record {} is {}, expected an object",
                            index + 1,
                            json_type_name(&other)
                        ),
                    })
                }
            };

            let mut data = HashMap::new();
            flatten_object(None, obj, &mut data, &mut dataset.columns, &mut seen);
            dataset.records.push(Record { data });
        }

        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn truncate(&mut self, max_records: usize) {
        self.records.truncate(max_records);
    }

    pub fn ensure_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    /// 刪除欄位，不存在的欄名直接忽略
    pub fn drop_columns(&mut self, columns: &[String]) {
        let to_drop: HashSet<&str> = columns.iter().map(String::as_str).collect();
        self.columns.retain(|c| !to_drop.contains(c.as_str()));
        for record in &mut self.records {
            record.data.retain(|k, _| !to_drop.contains(k.as_str()));
        }
    }

    /// 依對照表同時改名；改名後與既有欄位重名時以改名後的值為準，欄位只保留一個
    pub fn rename_columns(&mut self, mapping: &HashMap<String, String>) {
        let mut renamed = Vec::with_capacity(self.columns.len());
        let mut seen = HashSet::new();
        for column in &self.columns {
            let target = mapping.get(column).unwrap_or(column);
            if seen.insert(target.clone()) {
                renamed.push(target.clone());
            }
        }
        self.columns = renamed;

        for record in &mut self.records {
            let mut data = HashMap::with_capacity(record.data.len());
            let mut moved = Vec::new();
            for (key, value) in record.data.drain() {
                match mapping.get(&key) {
                    Some(target) => moved.push((target.clone(), value)),
                    None => {
                        data.insert(key, value);
                    }
                }
            }
            data.extend(moved);
            record.data = data;
        }
    }

    /// 對已存在的欄位逐列套用轉換；欄位不存在時不做任何事
    pub fn map_column<F>(&mut self, column: &str, mut f: F)
    where
        F: FnMut(&Value) -> Value,
    {
        if !self.has_column(column) {
            return;
        }
        for record in &mut self.records {
            let current = record.data.get(column).unwrap_or(&Value::Null);
            let next = f(current);
            record.data.insert(column.to_string(), next);
        }
    }

    /// 以整欄資料覆寫（或新增）欄位
    pub fn set_column(&mut self, column: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.records.len() {
            return Err(EtlError::ProcessingError {
                message: format!(
                    "column '{}' has {} values for {} records",
                    column,
                    values.len(),
                    self.records.len()
                ),
            });
        }
        self.ensure_column(column);
        for (record, value) in self.records.iter_mut().zip(values) {
            record.data.insert(column.to_string(), value);
        }
        Ok(())
    }

    /// 依偏好順序排列欄位，未列出的欄位保持原順序接在後面
    pub fn reorder_columns(&mut self, preferred: &[String]) {
        let mut ordered: Vec<String> = preferred
            .iter()
            .filter(|c| self.has_column(c))
            .cloned()
            .collect();
        let placed: HashSet<String> = ordered.iter().cloned().collect();
        ordered.extend(self.columns.iter().filter(|c| !placed.contains(*c)).cloned());
        ordered.dedup();
        self.columns = ordered;
    }

    /// 依欄位順序輸出 JSON 物件陣列
    pub fn to_json_rows(&self) -> Vec<Value> {
        self.records
            .iter()
            .map(|record| {
                let mut obj = Map::new();
                for column in &self.columns {
                    let value = record.data.get(column).cloned().unwrap_or(Value::Null);
                    obj.insert(column.clone(), value);
                }
                Value::Object(obj)
            })
            .collect()
    }
}

fn flatten_object(
    prefix: Option<&str>,
    obj: Map<String, Value>,
    data: &mut HashMap<String, Value>,
    columns: &mut Vec<String>,
    seen: &mut HashSet<String>,
) {
    for (key, value) in obj {
        let name = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key,
        };
        match value {
            Value::Object(nested) => flatten_object(Some(name.as_str()), nested, data, columns, seen),
            other => {
                if seen.insert(name.clone()) {
                    columns.push(name.clone());
                }
                data.insert(name, other);
            }
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeStatus {
    Success,
    NoResult,
    ApiError,
    Error,
    Skipped,
}

impl GeocodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeocodeStatus::Success => "success",
            GeocodeStatus::NoResult => "no_result",
            GeocodeStatus::ApiError => "api_error",
            GeocodeStatus::Error => "error",
            GeocodeStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for GeocodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeFailure {
    /// 1-based row number in the uploaded file
    pub row: usize,
    pub address: Option<String>,
    pub status: GeocodeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub input_records: usize,
    pub output_records: usize,
    pub ic_errors: usize,
    pub unmatched_postcodes: usize,
    pub geocode_summary: BTreeMap<String, usize>,
    pub geocode_failures: Vec<GeocodeFailure>,
}

impl ProcessingReport {
    pub fn new(input_records: usize) -> Self {
        Self {
            input_records,
            ..Default::default()
        }
    }

    pub fn geocoded(&self, status: GeocodeStatus) -> usize {
        self.geocode_summary.get(status.as_str()).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub dataset: Dataset,
    pub report: ProcessingReport,
}
