//! 報名資料的欄位清理規則，依固定順序套用在攤平後的資料表上。

use crate::domain::model::Dataset;
use crate::domain::settings::CleaningRules;
use crate::utils::error::Result;
use serde_json::Value;
use std::collections::HashMap;

pub const PROGRAM: &str = "program";
pub const DATE: &str = "date";
pub const IC: &str = "ic";
pub const AGE: &str = "age";
pub const PHONE: &str = "phone";
pub const SALARY: &str = "salary_monthly";
pub const ADDRESS: &str = "address";
pub const POSTCODE: &str = "postcode";

pub const IC_ERROR: &str = "IC ERROR";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningSummary {
    pub ic_errors: usize,
}

/// 依序套用所有清理規則（刪欄、改名、值轉換、年齡、地址）
pub fn apply_cleaning_rules(dataset: &mut Dataset, rules: &CleaningRules) -> Result<CleaningSummary> {
    dataset.drop_columns(&rules.drop_columns);
    dataset.rename_columns(&rules.column_mapping);

    dataset.map_column(PROGRAM, |v| map_program_value(v, &rules.program_mapping));
    dataset.map_column(DATE, reformat_date);
    for column in &rules.uppercase_columns {
        dataset.map_column(column, to_uppercase);
    }
    dataset.map_column(PHONE, format_phone_number);
    dataset.map_column(SALARY, format_salary);

    let ages: Vec<Value> = dataset
        .records
        .iter()
        .map(|record| {
            let ic = record.data.get(IC).unwrap_or(&Value::Null);
            age_from_ic(ic, rules.reference_year, rules.century_pivot)
        })
        .collect();
    let ic_errors = ages
        .iter()
        .filter(|age| age.as_str() == Some(IC_ERROR))
        .count();
    if !dataset.has_column(IC) {
        tracing::warn!("⚠️ No '{}' column found, every age is marked as {}", IC, IC_ERROR);
    }
    dataset.set_column(AGE, ages)?;

    dataset.map_column(ADDRESS, |v| clean_address(v, &rules.country_suffix));

    tracing::debug!(
        "Cleaning rules applied to {} records ({} IC errors)",
        dataset.len(),
        ic_errors
    );

    Ok(CleaningSummary { ic_errors })
}

/// 字串與數字轉成文字，其餘型別不處理
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn map_program_value(value: &Value, mapping: &HashMap<String, String>) -> Value {
    match value.as_str().and_then(|code| mapping.get(code)) {
        Some(name) => Value::String(name.clone()),
        None => value.clone(),
    }
}

/// 只保留前 10 個字元（`YYYY-MM-DD`）
pub fn reformat_date(value: &Value) -> Value {
    match value_text(value) {
        Some(text) => Value::String(text.chars().take(10).collect()),
        None => value.clone(),
    }
}

pub fn to_uppercase(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_uppercase()),
        other => other.clone(),
    }
}

/// 補上馬來西亞國碼：以 `1` 開頭補 `+60`，其餘補 `+601`；已帶 `+` 的號碼不動
pub fn format_phone_number(value: &Value) -> Value {
    let Some(text) = value_text(value) else {
        return value.clone();
    };
    let number = text.trim();

    if number.is_empty() || number.starts_with('+') {
        Value::String(number.to_string())
    } else if number.starts_with('1') {
        Value::String(format!("+60{}", number))
    } else {
        Value::String(format!("+601{}", number))
    }
}

/// 非負小數格式化成兩位小數字串，其他值原樣保留
pub fn format_salary(value: &Value) -> Value {
    let Some(text) = value_text(value) else {
        return value.clone();
    };

    let digits = text.replacen('.', "", 1);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return value.clone();
    }

    match text.parse::<f64>() {
        Ok(amount) => Value::String(format!("{:.2}", amount)),
        Err(_) => value.clone(),
    }
}

/// 由 12 位身分證號碼推算年齡，號碼本身不變；格式不符回傳 `IC ERROR`
pub fn age_from_ic(ic: &Value, reference_year: i32, century_pivot: u32) -> Value {
    let ic_number = match ic {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_u64() {
            Some(n) => n.to_string(),
            None => return Value::String(IC_ERROR.to_string()),
        },
        _ => return Value::String(IC_ERROR.to_string()),
    };

    if ic_number.len() != 12 || !ic_number.chars().all(|c| c.is_ascii_digit()) {
        return Value::String(IC_ERROR.to_string());
    }

    let Ok(year) = ic_number[..2].parse::<u32>() else {
        return Value::String(IC_ERROR.to_string());
    };
    let birth_year = if year <= century_pivot {
        2000 + year as i32
    } else {
        1900 + year as i32
    };

    Value::from(i64::from(reference_year - birth_year))
}

/// 合併換行、清掉多餘逗號，並補上國名後綴
pub fn clean_address(value: &Value, country_suffix: &str) -> Value {
    let Value::String(address) = value else {
        return value.clone();
    };

    let cleaned = address
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .replace(", ,", ",");
    let cleaned = cleaned
        .trim_end_matches(|c: char| c == ',' || c.is_whitespace())
        .trim();

    if cleaned.is_empty() {
        return Value::String(String::new());
    }

    let suffix = format!(", {}", country_suffix);
    if cleaned.ends_with(&suffix) {
        Value::String(cleaned.to_string())
    } else {
        Value::String(format!("{}{}", cleaned, suffix))
    }
}
